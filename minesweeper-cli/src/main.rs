use anyhow::Result;
use games_minesweeper::Reveal;
use tracing::{error, info};

mod config;
mod registry_init;
mod session;

use crate::config::{Command, Config};
use crate::session::Session;

fn main() -> Result<()> {
    // Parse configuration
    let config = Config::load()?;

    // Validate configuration
    config.validate()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .init();

    let registry = registry_init::initialize_registry()?;
    let mut rng = config.rng();
    let save_path = config.save_path();

    info!(command = ?config.command, path = %save_path.display(), "starting");

    let result = match &config.command {
        Command::New => {
            let session = Session::fresh(registry, save_path, &mut rng);
            session.save().map(|()| print!("{}", session.board()))
        }
        Command::Show => {
            let session = Session::open(registry, save_path, &mut rng);
            print!("{}", session.board());
            Ok(())
        }
        Command::Reveal { area } => {
            let mut session = Session::open(registry, save_path, &mut rng);
            session.reveal(*area).map(|outcome| {
                print!("{}", session.board());
                match outcome {
                    Reveal::Safe => println!("safe, {} uncovered", session.board().step()),
                    Reveal::Mine => println!("boom, game over"),
                    Reveal::Cleared => println!("cleared, you win"),
                    Reveal::Ignored => println!("nothing to uncover there"),
                }
            })
        }
        Command::Dump => {
            let session = Session::open(registry, save_path, &mut rng);
            session.dump().map(|text| println!("{}", text))
        }
    };

    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
    }
    result
}
