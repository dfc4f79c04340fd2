//! Daemon entry point: flag parsing, runtime bring-up, exit-code mapping.

mod cli;
mod daemon;
mod exit;
mod transport;

use clap::Parser;

fn main() {
    let args = match cli::Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() { exit::USAGE } else { exit::OK };
            std::process::exit(code);
        }
    };

    if args.version {
        println!("ljudvakt {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(exit::OK);
    }

    // Single-loop cooperative scheduling: the dispatcher, hook executors,
    // state timers and reservation callbacks all share one thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start the event loop: {err}");
            std::process::exit(exit::SOFTWARE);
        }
    };

    let code = runtime.block_on(daemon::run(args));
    std::process::exit(code);
}
