use sml_listener::app::{self, ArgsOutcome, EXIT_ERROR, EXIT_SUCCESS};
use std::panic::{self, PanicHookInfo};

const EXIT_PANIC: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Keep a distinct exit status for crashes so supervisors can tell them apart
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let options = match app::parse_args(std::env::args_os()) {
        ArgsOutcome::Run(options) => options,
        ArgsOutcome::Exit {
            code,
            message,
            diagnostic,
        } => {
            if let Some(diagnostic) = diagnostic {
                eprintln!("{}", diagnostic);
            }
            println!("{}", message);
            std::process::exit(code);
        }
    };

    match app::run(&options).await {
        Ok(_) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
