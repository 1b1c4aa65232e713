//! Loading and saving the current round
//!
//! The save file holds one `GameSave` record in the engine's text format.
//! Reading goes through `load_by_name`, writing builds the record by name and
//! fills it field by field, so both directions exercise the registry tables.

use anyhow::{anyhow, Context, Result};
use games_minesweeper::{Board, GameSave, Reveal};
use rand_chacha::ChaCha20Rng;
use reflect_core::{Registry, Serializable};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Session<'r> {
    registry: &'r Registry,
    path: PathBuf,
    board: Board,
}

impl<'r> Session<'r> {
    /// Resume the round saved at `path`, or start a new one
    pub fn open(registry: &'r Registry, path: &Path, rng: &mut ChaCha20Rng) -> Self {
        let save = load_save(registry, path);
        Self {
            registry,
            path: path.to_path_buf(),
            board: Board::resume(save, rng),
        }
    }

    /// Start a new round, ignoring any save
    pub fn fresh(registry: &'r Registry, path: &Path, rng: &mut ChaCha20Rng) -> Self {
        Self {
            registry,
            path: path.to_path_buf(),
            board: Board::new(rng),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Uncover `area` and save the result
    pub fn reveal(&mut self, area: usize) -> Result<Reveal> {
        let outcome = self.board.reveal(area)?;
        info!(area, ?outcome, step = self.board.step(), "applied move");
        self.save()?;
        Ok(outcome)
    }

    /// Save file text for the current round
    pub fn dump(&self) -> Result<String> {
        save_text(self.registry, &self.board)
    }

    pub fn save(&self) -> Result<()> {
        let text = self.dump()?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write save file {}", self.path.display()))?;
        info!(path = %self.path.display(), "saved game");
        Ok(())
    }
}

/// Read the save at `path`
///
/// A missing file yields `None`. An unreadable or undecodable file is logged
/// and also yields `None`, so the caller starts over.
pub fn load_save(registry: &Registry, path: &Path) -> Option<GameSave> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no saved game");
            return None;
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read saved game");
            return None;
        }
    };

    match registry.load_by_name(&text, GameSave::CLASS_NAME) {
        Ok(instance) => match instance.downcast::<GameSave>() {
            Ok(save) => Some(*save),
            Err(_) => {
                warn!("registry built another type for GameSave");
                None
            }
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to decode saved game");
            None
        }
    }
}

/// Encode `board` as save file text
///
/// A finished round only records `over`; everything else keeps its default.
pub fn save_text(registry: &Registry, board: &Board) -> Result<String> {
    let class = GameSave::CLASS_NAME;
    let mut instance = registry.get_instance(class)?;
    registry.set_field_dyn(instance.as_mut(), class, "over", board.is_over())?;
    if !board.is_over() {
        registry.set_field_dyn(instance.as_mut(), class, "mine", board.mine())?;
        registry.set_field_dyn(instance.as_mut(), class, "step", board.step())?;
        registry.set_field_dyn(instance.as_mut(), class, "areas", *board.areas())?;
    }

    let text = {
        let save = instance
            .downcast_ref::<GameSave>()
            .ok_or_else(|| anyhow!("registry built another type for {}", class))?;
        registry.dump(save)?
    };
    registry.delete_instance(class, instance)?;
    Ok(text)
}
