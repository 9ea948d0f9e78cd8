use ratatui::layout::Rect;
use tokio::sync::watch;
use travelpal_core::{ConversationController, PendingReply, Reply};

/// Lines the chat pane scrolls per wheel notch
pub const WHEEL_STEP: u16 = 3;

pub struct App {
    pub should_quit: bool,
    pub controller: ConversationController,

    /// Request spawned by the last accepted submit, until its reply lands
    pub pending: Option<PendingReply>,

    // Input state (cursor is a character index into the draft)
    pub cursor: usize,

    // Chat pane state, refreshed on every draw
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,

    pub animation_frame: u8,

    scroll_rx: watch::Receiver<usize>,
}

impl App {
    pub fn new(controller: ConversationController) -> Self {
        let scroll_rx = controller.subscribe_scroll();
        Self {
            should_quit: false,
            controller,
            pending: None,
            cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,
            scroll_rx,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.controller.is_busy()
    }

    /// Send the draft. Returns false when the controller refused it.
    pub fn submit(&mut self) -> bool {
        let text = self.controller.draft().to_string();
        match self.controller.dispatch(&text) {
            Some(pending) => {
                self.pending = Some(pending);
                self.cursor = 0;
                true
            }
            None => false,
        }
    }

    /// Hand the finished request back to the controller
    pub fn finish(&mut self, reply: Reply) {
        self.pending = None;
        self.controller.resolve(reply);
        self.animation_frame = 0;
    }

    // Draft editing

    fn draft_len(&self) -> usize {
        self.controller.draft().chars().count()
    }

    pub fn insert_char(&mut self, c: char) {
        if self.controller.insert_char(self.cursor, c) {
            self.cursor += 1;
        }
    }

    pub fn insert_str(&mut self, text: &str) {
        // Single-line input: pasted newlines become spaces
        for c in text.chars() {
            self.insert_char(if c == '\n' || c == '\r' { ' ' } else { c });
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 && self.controller.remove_char(self.cursor - 1) {
            self.cursor -= 1;
        }
    }

    pub fn delete(&mut self) {
        self.controller.remove_char(self.cursor);
    }

    pub fn clear_draft(&mut self) {
        if self.controller.set_draft(String::new()) {
            self.cursor = 0;
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.draft_len());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.draft_len();
    }

    // Chat scrolling

    /// Follow the controller's scroll signal
    pub fn sync_scroll(&mut self) {
        if self.scroll_rx.has_changed().unwrap_or(false) {
            self.scroll_rx.borrow_and_update();
            self.scroll_to_bottom();
        }
    }

    /// Rendered height of the conversation, including the "Thinking..."
    /// indicator while busy. Saturates at `u16::MAX`.
    pub fn chat_line_count(&self) -> u16 {
        // Fall back to a sane width before the first draw
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;
        for msg in self.controller.messages() {
            total_lines = total_lines.saturating_add(2); // sender label and gap
            for line in msg.text().lines() {
                total_lines = total_lines.saturating_add(wrapped_rows(line, wrap_width));
            }
        }

        if self.is_busy() {
            total_lines = total_lines.saturating_add(2);
        }
        total_lines.min(u16::MAX as usize) as u16
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_line_count().saturating_sub(visible_height)
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

/// Resolves with the outstanding reply; never resolves when there is none
pub async fn next_reply(pending: &mut Option<PendingReply>) -> Reply {
    match pending {
        Some(reply) => reply.await,
        None => std::future::pending().await,
    }
}

/// Rows `line` takes when word-wrapped to `width` columns. Words are moved
/// to the next row whole; a word wider than a row is split.
fn wrapped_rows(line: &str, width: usize) -> usize {
    let width = width.max(1);
    let mut rows = 1;
    let mut used = 0;

    for (i, word) in line.split(' ').enumerate() {
        let len = word.chars().count();
        if i > 0 && used + 1 + len <= width {
            used += 1 + len;
            continue;
        }
        if i > 0 && used > 0 {
            rows += 1;
        }
        if len > width {
            rows += (len - 1) / width;
            used = (len - 1) % width + 1;
        } else {
            used = len;
        }
    }
    rows
}
