//! Nine-cell mine game and its save record
//!
//! This crate provides the game the `minesweeper` binary plays, and the
//! `GameSave` record that persists a round through the reflection engine.

use std::fmt;

use rand::Rng;
use rand_chacha::ChaCha20Rng;
use reflect_core::{field, method, reflect_record, Config, Registry, Serializable};
use tracing::{debug, info};

/// Number of cells on the board
pub const AREA_COUNT: usize = 9;

/// Errors raised by game moves and save validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Area {0} is out of range (expected 0..9)")]
    AreaOutOfRange(usize),
    #[error("Save data is inconsistent: {0}")]
    InvalidSave(String),
}

/// Outcome of uncovering one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal {
    /// A safe cell was uncovered and the round goes on
    Safe,
    /// The mine was uncovered; the round is lost
    Mine,
    /// The last safe cell was uncovered; the round is won
    Cleared,
    /// The cell was already uncovered or the round is over
    Ignored,
}

/// One round of the game
///
/// `areas[i]` is `true` while cell `i` is still covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    areas: [bool; AREA_COUNT],
    mine: i32,
    step: i32,
    over: bool,
}

impl Board {
    /// Start a round with every cell covered and a random mine
    pub fn new(rng: &mut ChaCha20Rng) -> Self {
        let mine = rng.gen_range(0..AREA_COUNT as i32);
        debug!(mine, "placed mine");
        Self {
            areas: [true; AREA_COUNT],
            mine,
            step: 0,
            over: false,
        }
    }

    /// Resume a saved round, or start a new one
    ///
    /// Anything but a consistent, unfinished save starts a fresh round.
    pub fn resume(save: Option<GameSave>, rng: &mut ChaCha20Rng) -> Self {
        match save.map(GameSave::into_board) {
            Some(Ok(Some(board))) => {
                info!(step = board.step, "resumed saved game");
                board
            }
            Some(Ok(None)) => {
                info!("saved game was over, starting a new one");
                Self::new(rng)
            }
            Some(Err(err)) => {
                info!(error = %err, "discarding saved game");
                Self::new(rng)
            }
            None => Self::new(rng),
        }
    }

    pub fn areas(&self) -> &[bool; AREA_COUNT] {
        &self.areas
    }

    pub fn mine(&self) -> i32 {
        self.mine
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn is_covered(&self, area: usize) -> bool {
        self.areas.get(area).copied().unwrap_or(false)
    }

    /// Uncover `area`
    ///
    /// # Errors
    ///
    /// Returns `AreaOutOfRange` if `area` is not a cell of the board.
    pub fn reveal(&mut self, area: usize) -> Result<Reveal, GameError> {
        if area >= AREA_COUNT {
            return Err(GameError::AreaOutOfRange(area));
        }
        if self.over || !self.areas[area] {
            return Ok(Reveal::Ignored);
        }

        self.areas[area] = false;
        self.step += 1;

        let outcome = if area as i32 == self.mine {
            Reveal::Mine
        } else if self.step as usize >= AREA_COUNT - 1 {
            Reveal::Cleared
        } else {
            Reveal::Safe
        };
        self.over = outcome != Reveal::Safe;
        debug!(area, step = self.step, ?outcome, "revealed area");
        Ok(outcome)
    }
}

impl fmt::Display for Board {
    /// Three rows of three cells: `#` covered, `.` uncovered, `*` the mine
    /// once the round is over
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, cells) in self.areas.chunks(3).enumerate() {
            let line: String = cells
                .iter()
                .enumerate()
                .map(|(offset, covered)| {
                    let area = (index * 3 + offset) as i32;
                    if self.over && area == self.mine {
                        '*'
                    } else if *covered {
                        '#'
                    } else {
                        '.'
                    }
                })
                .collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Persisted form of a `Board`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSave {
    pub over: bool,
    pub mine: i32,
    pub step: i32,
    pub areas: [bool; AREA_COUNT],
}

impl GameSave {
    pub fn from_board(board: &Board) -> Self {
        Self {
            over: board.over,
            mine: board.mine,
            step: board.step,
            areas: board.areas,
        }
    }

    /// Save written for a finished round: only `over` carries information
    pub fn finished() -> Self {
        Self {
            over: true,
            ..Self::default()
        }
    }

    /// Board described by this save, or `None` if the round is over
    ///
    /// # Errors
    ///
    /// Returns `InvalidSave` if the fields contradict each other.
    pub fn into_board(self) -> Result<Option<Board>, GameError> {
        if self.over {
            return Ok(None);
        }
        if !(0..AREA_COUNT as i32).contains(&self.mine) {
            return Err(GameError::InvalidSave(format!("mine {} is off the board", self.mine)));
        }
        let uncovered = self.areas.iter().filter(|covered| !**covered).count() as i32;
        if uncovered != self.step {
            return Err(GameError::InvalidSave(format!(
                "step {} does not match {} uncovered areas",
                self.step, uncovered
            )));
        }
        if !self.areas[self.mine as usize] {
            return Err(GameError::InvalidSave("mine is uncovered in a running game".to_string()));
        }
        Ok(Some(Board {
            areas: self.areas,
            mine: self.mine,
            step: self.step,
            over: false,
        }))
    }

    /// Apply a move to the saved round
    pub fn reveal(&mut self, area: usize) -> Result<Reveal, GameError> {
        let mut board = self
            .clone()
            .into_board()?
            .ok_or_else(|| GameError::InvalidSave("round is over".to_string()))?;
        let outcome = board.reveal(area)?;
        *self = Self::from_board(&board);
        Ok(outcome)
    }
}

/// Signature under which `GameSave::reveal` is registered
pub type RevealMethod = fn(&mut GameSave, usize) -> Result<Reveal, GameError>;

impl Serializable for GameSave {
    const CLASS_NAME: &'static str = "GameSave";

    fn get_config(&self, registry: &Registry) -> reflect_core::Result<Config> {
        let mut config = Config::of::<Self>();
        config.update(
            registry,
            [
                field!(registry, self, over),
                field!(registry, self, mine),
                field!(registry, self, step),
                field!(registry, self, areas),
                method!(registry, GameSave, reveal: RevealMethod),
            ],
        )?;
        Ok(config)
    }
}

reflect_record!(GameSave);

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(7)
    }

    fn board_with_mine(mine: i32) -> Board {
        Board {
            areas: [true; AREA_COUNT],
            mine,
            step: 0,
            over: false,
        }
    }

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register::<GameSave>().unwrap();
        registry
    }

    #[test]
    fn test_new_board() {
        let board = Board::new(&mut rng());
        assert_eq!(board.areas(), &[true; AREA_COUNT]);
        assert!((0..9).contains(&board.mine()));
        assert_eq!(board.step(), 0);
        assert!(!board.is_over());
    }

    #[test]
    fn test_seeded_boards_match() {
        assert_eq!(Board::new(&mut rng()), Board::new(&mut rng()));
    }

    #[test]
    fn test_reveal_safe_area() {
        let mut board = board_with_mine(4);
        assert_eq!(board.reveal(0).unwrap(), Reveal::Safe);
        assert!(!board.is_covered(0));
        assert_eq!(board.step(), 1);
        assert!(!board.is_over());
    }

    #[test]
    fn test_reveal_twice_is_ignored() {
        let mut board = board_with_mine(4);
        board.reveal(0).unwrap();
        assert_eq!(board.reveal(0).unwrap(), Reveal::Ignored);
        assert_eq!(board.step(), 1);
    }

    #[test]
    fn test_reveal_mine_ends_round() {
        let mut board = board_with_mine(4);
        assert_eq!(board.reveal(4).unwrap(), Reveal::Mine);
        assert!(board.is_over());
        assert_eq!(board.reveal(5).unwrap(), Reveal::Ignored);
    }

    #[test]
    fn test_clearing_every_safe_area_wins() {
        let mut board = board_with_mine(8);
        for area in 0..7 {
            assert_eq!(board.reveal(area).unwrap(), Reveal::Safe);
        }
        assert_eq!(board.reveal(7).unwrap(), Reveal::Cleared);
        assert!(board.is_over());
        assert!(board.is_covered(8));
    }

    #[test]
    fn test_reveal_out_of_range() {
        let mut board = board_with_mine(0);
        assert_eq!(board.reveal(9), Err(GameError::AreaOutOfRange(9)));
    }

    #[test]
    fn test_display() {
        let mut board = board_with_mine(2);
        board.reveal(0).unwrap();
        assert_eq!(board.to_string(), ".##\n###\n###\n");
        board.reveal(2).unwrap();
        assert_eq!(board.to_string(), ".#*\n###\n###\n");
    }

    #[test]
    fn test_save_round_trip() {
        let registry = registry();
        let save = GameSave {
            over: false,
            mine: 4,
            step: 0,
            areas: [true; AREA_COUNT],
        };

        let text = registry.dump(&save).unwrap();
        assert_eq!(
            text,
            "{\n\"class_name\":\"GameSave\",\n\"over\":false,\n\"mine\":4,\n\"step\":0,\n\
             \"areas\":[true,true,true,true,true,true,true,true,true]\n}"
        );
        assert_eq!(registry.load::<GameSave>(&text).unwrap(), save);
    }

    #[test]
    fn test_changing_mine_changes_one_line() {
        let registry = registry();
        let mut save = GameSave {
            over: false,
            mine: 4,
            step: 0,
            areas: [true; AREA_COUNT],
        };
        let before = registry.dump(&save).unwrap();
        save.mine = 7;
        let after = registry.dump(&save).unwrap();

        let changed: Vec<(&str, &str)> = before
            .lines()
            .zip(after.lines())
            .filter(|(old, new)| old != new)
            .collect();
        assert_eq!(changed, vec![("\"mine\":4,", "\"mine\":7,")]);
    }

    #[test]
    fn test_save_field_order() {
        let registry = registry();
        assert_eq!(
            registry.get_field_names::<GameSave>(),
            vec!["over", "mine", "step", "areas"]
        );
        assert_eq!(registry.get_field_type("GameSave", "areas").unwrap(), "[bool; 9]");
    }

    #[test]
    fn test_reveal_method_by_name() {
        let registry = registry();
        assert_eq!(registry.get_method_names("GameSave"), vec!["reveal"]);

        let reveal = registry
            .get_method::<RevealMethod>("GameSave", "reveal")
            .unwrap();
        let mut save = GameSave::from_board(&board_with_mine(3));
        assert_eq!(reveal(&mut save, 1).unwrap(), Reveal::Safe);
        assert_eq!(save.step, 1);
        assert!(!save.areas[1]);
    }

    #[test]
    fn test_fill_save_by_name() {
        let registry = registry();
        let mut instance = registry.get_instance("GameSave").unwrap();
        registry
            .set_field_dyn(instance.as_mut(), "GameSave", "mine", 6i32)
            .unwrap();
        registry
            .set_field_dyn(instance.as_mut(), "GameSave", "areas", [true; AREA_COUNT])
            .unwrap();

        let save = instance.downcast_ref::<GameSave>().unwrap();
        assert_eq!(save.mine, 6);
        assert_eq!(save.areas, [true; AREA_COUNT]);
    }

    #[test]
    fn test_older_numeric_booleans_load() {
        let registry = registry();
        let text = "{\"class_name\":\"GameSave\",\"over\":0,\"mine\":2,\"step\":1,\
                    \"areas\":[0,1,1,1,1,1,1,1,1]}";
        let save = registry.load::<GameSave>(text).unwrap();
        assert!(!save.over);
        assert!(!save.areas[0]);
        assert!(save.into_board().unwrap().is_some());
    }

    #[test]
    fn test_resume_rules() {
        let saved = GameSave::from_board(&board_with_mine(5));
        assert_eq!(Board::resume(Some(saved), &mut rng()), board_with_mine(5));

        let fresh = Board::new(&mut rng());
        assert_eq!(Board::resume(Some(GameSave::finished()), &mut rng()), fresh);
        assert_eq!(Board::resume(None, &mut rng()), fresh);
    }

    #[test]
    fn test_inconsistent_saves_are_rejected() {
        let mut save = GameSave::from_board(&board_with_mine(5));
        save.mine = 12;
        assert!(matches!(save.into_board(), Err(GameError::InvalidSave(_))));

        let mut save = GameSave::from_board(&board_with_mine(5));
        save.step = 3;
        assert!(matches!(save.into_board(), Err(GameError::InvalidSave(_))));

        let mut save = GameSave::from_board(&board_with_mine(5));
        save.areas[5] = false;
        save.step = 1;
        assert!(matches!(save.into_board(), Err(GameError::InvalidSave(_))));
    }
}
