//! Terminal rendition of the confirm/notify dialog.

use async_trait::async_trait;
use client_core::UserDialog;
use shared::domain::RecordId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub struct TerminalDialog {
    assume_yes: bool,
}

impl TerminalDialog {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl UserDialog for TerminalDialog {
    async fn confirm_delete(&self, id: &RecordId) -> bool {
        if self.assume_yes {
            return true;
        }

        let mut stdout = tokio::io::stdout();
        if stdout
            .write_all(format!("Delete record {id}? [y/N] ").as_bytes())
            .await
            .and(stdout.flush().await)
            .is_err()
        {
            return false;
        }

        let mut answer = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut answer).await {
            Ok(_) => is_affirmative(&answer),
            Err(err) => {
                tracing::warn!(error = %err, "dialog: could not read confirmation");
                false
            }
        }
    }

    async fn notify(&self, title: &str, message: &str) {
        println!("{title}: {message}");
    }
}
