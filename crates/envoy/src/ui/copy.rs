use std::time::{Duration, Instant};

const FLASH_FOR: Duration = Duration::from_millis(1200);

pub trait Clipboard {
    fn set_text(&mut self, text: String) -> Result<(), String>;
}

/// The system clipboard, opened per copy.
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: String) -> Result<(), String> {
        arboard::Clipboard::new()
            .and_then(|mut cb| cb.set_text(text))
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flash {
    index: usize,
    copied: bool,
    until: Instant,
}

/// One "copy" label per code block on screen.
///
/// Blocks are re-attached on every draw; attaching the same blocks again
/// changes nothing, so labels never pile up.
#[derive(Debug, Default)]
pub struct CopyAffordance {
    blocks: Vec<String>,
    flash: Option<Flash>,
}

impl CopyAffordance {
    pub fn attach(&mut self, blocks: Vec<String>) {
        if let Some(flash) = self.flash {
            if self.blocks.get(flash.index) != blocks.get(flash.index) {
                self.flash = None;
            }
        }
        self.blocks = blocks;
    }

    pub fn label(&self, index: usize) -> String {
        self.label_at(index, Instant::now())
    }

    fn label_at(&self, index: usize, now: Instant) -> String {
        match self.flash {
            Some(f) if f.index == index && now < f.until => {
                let label = if f.copied { "[已复制]" } else { "[复制失败]" };
                label.to_string()
            }
            _ => format!("[复制 {}]", index + 1),
        }
    }

    /// Copies block `index`. Returns `None` if there is no such block.
    pub fn copy(&mut self, index: usize, clipboard: &mut dyn Clipboard) -> Option<bool> {
        let code = self.blocks.get(index)?.clone();
        let copied = match clipboard.set_text(code) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Copy to clipboard failed: {}", e);
                false
            }
        };

        self.flash = Some(Flash {
            index,
            copied,
            until: Instant::now() + FLASH_FOR,
        });
        Some(copied)
    }

    /// Clears an expired flash. Returns true when the labels changed.
    pub fn expire(&mut self) -> bool {
        self.expire_at(Instant::now())
    }

    fn expire_at(&mut self, now: Instant) -> bool {
        match self.flash {
            Some(f) if now >= f.until => {
                self.flash = None;
                true
            }
            _ => false,
        }
    }
}
