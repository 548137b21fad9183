mod args;
mod op;
mod ops;
mod process;
mod settings;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Migrate, Status, Version};

command_enum! {
    (Migrate, Migrate),
    (Status, Status),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let guards = process::init_logging(args.log_level, args.log_dir.as_deref());

    let ctx = match op::OpContext::new(
        args.remote.url(),
        args.config_dir,
        args.store_api,
        args.settings,
    ) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            drop(guards);
            std::process::exit(1);
        }
    };

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush buffered log lines before exiting
    drop(guards);
    std::process::exit(code);
}
