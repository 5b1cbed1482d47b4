//! xboard (CECP) front-end and command loop.
//!
//! Reads one command per line, keeps the engine context (position, engine
//! side, go mode, limits) and routes search requests to the dispatcher.
//! Failures are reported as `Error (<reason>): <command>` and never stop the
//! loop; only `quit` or end of input does.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compute::buffers::ResourceLimits;
use crate::errors::EngineError;
use crate::game_state::chess_types::*;
use crate::moves::move_apply::{apply_move, undo_move};
use crate::search::dispatcher::{SearchDispatcher, SearchRequest};
use crate::utils::long_algebraic::{move_to_text, parse_user_move};
use crate::utils::render_game_state::render_board;
use crate::xboard::commands::{parse_command, Command};

pub const ENGINE_NAME: &str = "Plum GPU";

pub fn feature_line() -> String {
    format!(
        "feature myname=\"{} {}\" reuse=0 colors=1 setboard=1 memory=1 smp=1 usermove=1 san=0 time=0 debug=1 sigint=0 ping=1 done=1",
        ENGINE_NAME,
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No position yet.
    Idle,
    Ready,
    Thinking,
    Terminated,
}

#[derive(Debug, Error)]
enum CommandFailure {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct XboardState {
    phase: Phase,
    game_state: GameState,
    engine_side: Color,
    go_mode: bool,
    max_depth: u32,
    limits: ResourceLimits,
    dispatcher: SearchDispatcher,
}

/// Keep running on SIGINT; only `quit` or end of input stops the engine.
pub fn ignore_interrupts() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| debug!("interrupt ignored"))
}

pub fn run_stdio_loop(state: &mut XboardState) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_loop(stdin.lock(), &mut stdout, state)
}

/// Process lines until `quit` or end of input. Device resources are
/// released either way.
pub fn run_loop(input: impl BufRead, out: &mut impl Write, state: &mut XboardState) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        let should_quit = state.handle_command(&line, out)?;
        out.flush()?;
        if should_quit {
            return Ok(());
        }
    }
    state.terminate();
    Ok(())
}

impl XboardState {
    pub fn new(dispatcher: SearchDispatcher, max_depth: u32, limits: ResourceLimits) -> Self {
        Self {
            phase: Phase::Idle,
            game_state: GameState::new_empty(),
            engine_side: Color::Dark,
            go_mode: false,
            max_depth,
            limits,
            dispatcher,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    pub fn engine_side(&self) -> Color {
        self.engine_side
    }

    /// Returns `Ok(true)` when the loop should stop.
    pub fn handle_command(&mut self, line: &str, out: &mut impl Write) -> io::Result<bool> {
        debug!(command = line.trim(), "xboard command");
        let outcome = parse_command(line)
            .map_err(CommandFailure::from)
            .and_then(|command| self.execute(command, out));

        match outcome {
            Ok(quit) => Ok(quit),
            Err(CommandFailure::Io(err)) => Err(err),
            Err(CommandFailure::Engine(err)) => {
                warn!(%err, command = line.trim(), "command failed");
                writeln!(out, "Error ({}): {}", err.protocol_reason(), line.trim())?;
                Ok(false)
            }
        }
    }

    fn execute(&mut self, command: Command<'_>, out: &mut impl Write) -> Result<bool, CommandFailure> {
        match command {
            Command::Xboard | Command::Force | Command::Blank => {}
            Command::Protover(version) => {
                debug!(version, "protover");
                writeln!(out, "{}", feature_line())?;
            }
            Command::New => {
                self.game_state = GameState::new_game();
                self.engine_side = Color::Dark;
                self.go_mode = false;
                self.phase = Phase::Ready;
                write!(out, "{}", render_board(&self.game_state.board))?;
            }
            Command::SetBoard(fen) => {
                self.game_state = GameState::from_fen(fen)?;
                self.phase = Phase::Ready;
                write!(out, "{}", render_board(&self.game_state.board))?;
            }
            Command::White => self.engine_side = Color::Light,
            Command::Black => self.engine_side = Color::Dark,
            Command::Sd(depth) => self.max_depth = depth,
            Command::Memory(mb) => self.limits.max_memory_mb = mb,
            Command::Cores(cores) => self.limits.max_cores = cores,
            Command::Go => {
                self.require_position()?;
                self.go_mode = true;
                self.engine_side = self.game_state.side_to_move;
                self.play_engine_move(out, false)?;
            }
            Command::UserMove(text) => self.handle_usermove(text, out)?,
            Command::Ping(token) => writeln!(out, "pong {token}")?,
            Command::Undo => self.take_back(1)?,
            Command::Remove => self.take_back(2)?,
            Command::Quit => {
                self.terminate();
                return Ok(true);
            }
            Command::Unknown(keyword) => debug!(keyword, "ignoring unknown command"),
        }
        Ok(false)
    }

    fn handle_usermove(&mut self, text: &str, out: &mut impl Write) -> Result<(), CommandFailure> {
        self.require_position()?;
        let mover = self.game_state.side_to_move;
        if !self.go_mode {
            self.engine_side = mover.opposite();
        }

        let mv = parse_user_move(text, &self.game_state.board, mover)?;
        apply_move(&mut self.game_state, mv)?;
        write!(out, "{}", render_board(&self.game_state.board))?;

        if self.go_mode && self.game_state.side_to_move == self.engine_side {
            // The user move stands; a failed reply is the engine's `go`, not the move's.
            match self.play_engine_move(out, true) {
                Err(CommandFailure::Engine(err)) => {
                    warn!(%err, "reply search failed");
                    writeln!(out, "Error ({}): go", err.protocol_reason())?;
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// Search for the side to move, apply the result and announce it.
    fn play_engine_move(&mut self, out: &mut impl Write, show_board: bool) -> Result<(), CommandFailure> {
        let request = SearchRequest::from_game(&self.game_state, self.max_depth, self.limits);
        self.phase = Phase::Thinking;
        let result = self.dispatcher.search(&request);
        self.phase = Phase::Ready;
        let result = result?;

        if result.best_move.is_null() {
            info!("no move found, resigning");
            writeln!(out, "resign")?;
            return Ok(());
        }

        let text = move_to_text(result.best_move)?;
        apply_move(&mut self.game_state, result.best_move)?;
        if show_board {
            write!(out, "{}", render_board(&self.game_state.board))?;
        }
        writeln!(out, "move {text}")?;
        Ok(())
    }

    fn take_back(&mut self, plies: usize) -> Result<(), EngineError> {
        self.require_position()?;
        if self.game_state.undo_stack.len() < plies {
            return Err(EngineError::IllegalMove("no move to take back".to_owned()));
        }
        for _ in 0..plies {
            undo_move(&mut self.game_state);
        }
        Ok(())
    }

    fn require_position(&self) -> Result<(), EngineError> {
        match self.phase {
            Phase::Idle | Phase::Terminated => Err(EngineError::NoPosition),
            Phase::Ready | Phase::Thinking => Ok(()),
        }
    }

    fn terminate(&mut self) {
        if self.phase != Phase::Terminated {
            self.dispatcher.shutdown();
            self.phase = Phase::Terminated;
        }
    }
}
