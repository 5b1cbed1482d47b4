//! Crate root module declarations for the Plum GPU engine.
//!
//! Exposes the board and move codec, the static tables mirrored to the
//! compute device, the device buffer manager, the search dispatcher and the
//! xboard front-end so the binary, benches and tests share module paths.

pub mod config;
pub mod errors;

pub mod game_state {
    pub mod board;
    pub mod chess_rules;
    pub mod chess_types;
    pub mod game_state;
    pub mod undo_state;
}

pub mod moves {
    pub mod move_apply;
    pub mod move_codec;
}

pub mod tables {
    pub mod attack_tables;
    pub mod sliding_tables;
}

pub mod compute {
    pub mod buffers;
    pub mod device;
    pub mod host_device;
    pub mod host_kernel;
    pub mod kernel_abi;
    #[cfg(test)]
    pub mod mock_device;
    #[cfg(feature = "gpu")]
    pub mod wgpu_device;
}

pub mod search {
    pub mod dispatcher;
}

pub mod xboard {
    pub mod commands;
    pub mod xboard_top;
}

pub mod utils {
    pub mod algebraic;
    pub mod diagnostics;
    pub mod fen_generator;
    pub mod fen_parser;
    pub mod long_algebraic;
    pub mod render_game_state;
}
