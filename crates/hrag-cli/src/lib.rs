//! CLI and HTTP interface for hrag

mod server;
mod session;
mod ui;


pub use server::{ServerState, create_router, serve, status_for};
pub use session::{
    CheckReport, answer_json, check_index, error_json, outcome_json, run_interactive,
    run_json_lines,
};
pub use ui::{
    describe_degradation, display_banner, handle_input_with_history, print_help, render_check,
    render_error, render_outcome,
};

// Re-export core types
pub use hrag_core::{Error, Result};
