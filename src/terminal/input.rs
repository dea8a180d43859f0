/// What a chunk of typed input means for the session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSignal {
    None,
    /// `exit`, `exit <status>` or `logout` was submitted.
    ExitCommand,
    /// Ctrl-D on an empty line.
    EndOfFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EscapeState {
    #[default]
    Ground,
    Escape,
    Csi,
    Ss3,
}

const MAX_TRACKED_LINE: usize = 256;

/// Tracks the line being typed into a remote shell so that a user-initiated
/// exit can be told apart from a dropped connection.
///
/// Anything that edits the line in a way we cannot follow (history recall,
/// cursor movement, tab completion, pastes) marks the line as uncertain and
/// it will not be reported as an exit.
#[derive(Debug, Clone, Default)]
pub struct ExitCommandDetector {
    line: String,
    uncertain: bool,
    escape: EscapeState,
}

impl ExitCommandDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> InputSignal {
        let mut signal = InputSignal::None;
        for ch in String::from_utf8_lossy(data).chars() {
            match self.push_char(ch) {
                InputSignal::None => {}
                detected => signal = detected,
            }
        }
        signal
    }

    pub fn pending_line(&self) -> &str {
        &self.line
    }

    pub fn reset(&mut self) {
        self.line.clear();
        self.uncertain = false;
        self.escape = EscapeState::Ground;
    }

    fn push_char(&mut self, ch: char) -> InputSignal {
        match self.escape {
            EscapeState::Ground => {}
            EscapeState::Escape => {
                self.escape = match ch {
                    '[' => EscapeState::Csi,
                    'O' => EscapeState::Ss3,
                    _ => EscapeState::Ground,
                };
                self.uncertain = true;
                return InputSignal::None;
            }
            EscapeState::Csi => {
                if ('@'..='~').contains(&ch) {
                    self.escape = EscapeState::Ground;
                }
                return InputSignal::None;
            }
            EscapeState::Ss3 => {
                self.escape = EscapeState::Ground;
                return InputSignal::None;
            }
        }

        match ch {
            '\r' | '\n' => {
                let signal = if !self.uncertain && is_exit_command(self.line.trim()) {
                    InputSignal::ExitCommand
                } else {
                    InputSignal::None
                };
                self.reset();
                signal
            }
            // Ctrl-C, Ctrl-U
            '\x03' | '\x15' => {
                self.reset();
                InputSignal::None
            }
            // Ctrl-D
            '\x04' => {
                if self.line.is_empty() && !self.uncertain {
                    self.reset();
                    InputSignal::EndOfFile
                } else {
                    InputSignal::None
                }
            }
            '\x7f' | '\x08' => {
                self.line.pop();
                InputSignal::None
            }
            '\x1b' => {
                self.escape = EscapeState::Escape;
                InputSignal::None
            }
            '\t' => {
                self.uncertain = true;
                InputSignal::None
            }
            c if c.is_control() => InputSignal::None,
            c => {
                if self.line.len() >= MAX_TRACKED_LINE {
                    self.uncertain = true;
                } else {
                    self.line.push(c);
                }
                InputSignal::None
            }
        }
    }
}

fn is_exit_command(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("exit"), None, None) | (Some("logout"), None, None) => true,
        (Some("exit"), Some(status), None) => status.chars().all(|c| c.is_ascii_digit()),
        _ => false,
    }
}
