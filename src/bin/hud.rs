//! HUD - live status line for a Claude Code session
//!
//! # Usage
//!
//! ```text
//! hud ~/.claude/projects/<project>/<session>.jsonl
//! hud --once session.jsonl            # print one line and exit
//! hud --issues .beads/issues.jsonl session.jsonl
//! ```

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    hud_cli::run().await
}
