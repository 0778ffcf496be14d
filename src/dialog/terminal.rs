//! 端末 (stdin / stdout) で動くダイアログ実装

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{Confirm, DirectoryPicker, Notice, NoticeLevel, Notifier, Prompt};

/// 1行読み取る。EOF や読み取り失敗は None
async fn read_line(question: &str) -> Option<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(question.as_bytes()).await.ok()?;
    stdout.flush().await.ok()?;

    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

/// 標準入力からパスを受け取る
#[derive(Debug, Default)]
pub struct TerminalPicker;

#[async_trait]
impl DirectoryPicker for TerminalPicker {
    async fn pick_directory(&self) -> Option<PathBuf> {
        let answer = read_line("Data folder (empty to cancel): ").await?;
        if answer.is_empty() {
            None
        } else {
            Some(PathBuf::from(answer))
        }
    }
}

/// 引数で渡されたパスをそのまま返す
#[derive(Debug, Clone)]
pub struct FixedPicker(pub Option<PathBuf>);

#[async_trait]
impl DirectoryPicker for FixedPicker {
    async fn pick_directory(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

/// y/N で確認する
#[derive(Debug, Default)]
pub struct TerminalConfirm;

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn ask(&self, prompt: &Prompt) -> bool {
        let question = format!("[{}] {} [y/N] ", prompt.title, prompt.message);
        matches!(
            read_line(&question).await.as_deref().map(str::to_lowercase).as_deref(),
            Some("y") | Some("yes")
        )
    }
}

/// 常に同じ答えを返す (--yes 用)
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn ask(&self, prompt: &Prompt) -> bool {
        log::debug!("auto-answering {:?} with {}", prompt.message, self.0);
        self.0
    }
}

#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Error => eprintln!("{}: {}", notice.title, notice.description),
            _ => println!("{}: {}", notice.title, notice.description),
        }
    }
}
