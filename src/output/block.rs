//! "Copy last block" support.
//!
//! This is a heuristic: prompts are recognised by shape only, so multi-line
//! commands or prompt-looking output can move the boundary. Best effort.

use regex::Regex;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\x1b\[[0-?]*[ -/]*[@-~]",              // CSI
        r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",  // OSC, BEL or ST terminated
        r"|\x1b[()*+].",                         // charset designation
        r"|\x1b[=>@-Z\\-_]",                     // other two-byte escapes
    ))
    .expect("ANSI escape pattern is valid")
});

// A prompt char ($ # % >) ending a leading token (`user@host:~$`, `[user@host ~]$`)
// and followed by whitespace or end of line.
static PROMPT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[^\s$#%>]*|\[[^\]]*\])[$#%>](?:\s|$)")
        .expect("prompt pattern is valid")
});

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

pub fn is_prompt_line(line: &str) -> bool {
    PROMPT_LINE.is_match(line)
}

/// Returns the lines from the second most recent prompt to the end, trimmed.
/// With fewer than two prompts everything is returned.
pub fn extract_last_block<S: AsRef<str>>(visible_lines: &[S]) -> String {
    let lines: Vec<String> = visible_lines
        .iter()
        .map(|line| strip_ansi(line.as_ref()))
        .collect();

    let start = lines
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, line)| is_prompt_line(line))
        .map(|(index, _)| index)
        .nth(1)
        .unwrap_or(0);

    lines[start..].join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(transcript: &str) -> Vec<&str> {
        transcript.split('\n').collect()
    }

    #[test]
    fn strips_colour_and_title_sequences() {
        let raw = "\x1b]0;user@host: ~\x07\x1b[01;32muser@host\x1b[00m:~$ ls";
        assert_eq!(strip_ansi(raw), "user@host:~$ ls");
    }

    #[test]
    fn recognises_common_prompt_shapes() {
        assert!(is_prompt_line("$ "));
        assert!(is_prompt_line("$"));
        assert!(is_prompt_line("user@host:~$ ls -la"));
        assert!(is_prompt_line("root@box:/# whoami"));
        assert!(is_prompt_line("[deploy@web01 app]$ make"));
        assert!(is_prompt_line("host% "));
        assert!(!is_prompt_line("file1"));
        assert!(!is_prompt_line("echo a > b"));
        assert!(!is_prompt_line("total 48"));
    }

    #[test]
    fn single_command_returns_whole_transcript() {
        let block = extract_last_block(&lines("$ ls\nfile1\nfile2\n$ "));
        assert_eq!(block, "$ ls\nfile1\nfile2\n$");
    }

    #[test]
    fn returns_from_second_most_recent_prompt() {
        let block = extract_last_block(&lines("$ cmd1\nout1\n$ cmd2\nout2\n$ "));
        assert_eq!(block, "$ cmd2\nout2\n$");
        assert!(!block.contains("out1"));
    }

    #[test]
    fn no_prompt_returns_everything() {
        let block = extract_last_block(&lines("just\nsome output\n"));
        assert_eq!(block, "just\nsome output");
    }

    #[test]
    fn escapes_do_not_hide_prompts() {
        let transcript = vec![
            "\x1b[32muser@host\x1b[0m:~$ uname",
            "Linux",
            "\x1b[32muser@host\x1b[0m:~$ date",
            "Tue Oct 18",
            "\x1b[32muser@host\x1b[0m:~$ ",
        ];
        assert_eq!(
            extract_last_block(&transcript),
            "user@host:~$ date\nTue Oct 18\nuser@host:~$"
        );
    }
}
