// src/job/commands.rs - plotter command-file parsing
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::PlotterError;

/// Declared totals from the two header lines, `d<total_mm>` and `h<height_mm>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub total_distance_mm: f64,
    pub height_mm: f64,
}

/// One parsed body line of a command file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandLine {
    PenUp,
    PenDown,
    MoveTo { x: f64, y: f64 },
    /// Circular arc to `(x, y)` around the centre at the current position
    /// plus `(i, j)`. `cw` distinguishes `G2` from `G3`.
    Arc { cw: bool, x: f64, y: f64, i: f64, j: f64 },
}

/// Streaming reader over a command file. The header is consumed on open so
/// every later `next_line` yields body content only.
pub struct CommandFile {
    reader: BufReader<File>,
}

impl CommandFile {
    pub fn open(path: &Path) -> Result<(Self, Header), PlotterError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                PlotterError::BadFile(format!("{}: no such file", path.display()))
            }
            _ => PlotterError::ResourceUnavailable(format!("{}: {e}", path.display())),
        })?;
        let mut reader = BufReader::new(file);
        let total_distance_mm = Self::header_value(&mut reader, 'd')?;
        let height_mm = Self::header_value(&mut reader, 'h')?;
        Ok((
            Self { reader },
            Header {
                total_distance_mm,
                height_mm,
            },
        ))
    }

    fn header_value(reader: &mut BufReader<File>, tag: char) -> Result<f64, PlotterError> {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| PlotterError::ResourceUnavailable(e.to_string()))?;
        if read == 0 {
            return Err(PlotterError::BadFile(format!("missing `{tag}` header line")));
        }
        let line = line.trim();
        if line.len() < 2 || !line.starts_with(tag) {
            return Err(PlotterError::BadFile(format!("expected `{tag}` header line")));
        }
        line[1..]
            .trim()
            .parse()
            .map_err(|_| PlotterError::BadFile(format!("unparseable `{tag}` header value")))
    }

    /// Next non-blank body line, trimmed. `None` at end of file.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
    }
}

/// Parse one body line. `None` marks a malformed line; the caller skips it
/// (it still counts toward start-line offsets).
pub fn parse_line(line: &str) -> Option<CommandLine> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(['p', 'P']) {
        return Some(if rest.starts_with('1') {
            CommandLine::PenDown
        } else {
            CommandLine::PenUp
        });
    }

    if let Some(arc) = parse_arc(line) {
        return Some(arc);
    }

    let mut tokens = line.split_whitespace();
    let x = tokens.next()?.parse().ok()?;
    let y = tokens.next()?.parse().ok()?;
    Some(CommandLine::MoveTo { x, y })
}

/// `G2`/`G3` lines come in two token forms: labelled (`G3 x10 y10 i10 j0`)
/// and positional (`G3 10 10 10 0`).
fn parse_arc(line: &str) -> Option<CommandLine> {
    let lower = line.to_ascii_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    let cw = match tokens.first() {
        Some(&"g2") => true,
        Some(&"g3") => false,
        _ => return None,
    };
    if tokens.len() < 2 {
        return None;
    }

    let labelled = tokens[1..]
        .iter()
        .any(|t| t.len() >= 2 && matches!(t.as_bytes()[0], b'x' | b'y' | b'i' | b'j'));

    if labelled {
        let (mut x, mut y, mut i, mut j) = (None, None, None, None);
        for token in &tokens[1..] {
            if token.len() < 2 {
                continue;
            }
            match token.as_bytes()[0] {
                b'x' => x = token[1..].parse().ok(),
                b'y' => y = token[1..].parse().ok(),
                b'i' => i = token[1..].parse().ok(),
                b'j' => j = token[1..].parse().ok(),
                _ => {}
            }
        }
        return Some(CommandLine::Arc {
            cw,
            x: x?,
            y: y?,
            i: i?,
            j: j?,
        });
    }

    if tokens.len() < 5 {
        return None;
    }
    Some(CommandLine::Arc {
        cw,
        x: tokens[1].parse().ok()?,
        y: tokens[2].parse().ok()?,
        i: tokens[3].parse().ok()?,
        j: tokens[4].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pen_lines() {
        assert_eq!(parse_line("p0"), Some(CommandLine::PenUp));
        assert_eq!(parse_line("p1"), Some(CommandLine::PenDown));
        // a bare `p` defaults to pen up
        assert_eq!(parse_line("p"), Some(CommandLine::PenUp));
    }

    #[test]
    fn parses_plain_moves() {
        assert_eq!(
            parse_line("12.5 340"),
            Some(CommandLine::MoveTo { x: 12.5, y: 340.0 })
        );
        assert_eq!(parse_line("only-one-token"), None);
        assert_eq!(parse_line("12.5 garbage"), None);
    }

    #[test]
    fn parses_positional_arcs() {
        assert_eq!(
            parse_line("G3 10 10 10 0"),
            Some(CommandLine::Arc {
                cw: false,
                x: 10.0,
                y: 10.0,
                i: 10.0,
                j: 0.0
            })
        );
    }

    #[test]
    fn parses_labelled_arcs_in_any_order() {
        assert_eq!(
            parse_line("g2 j-4 i3 y20 x10"),
            Some(CommandLine::Arc {
                cw: true,
                x: 10.0,
                y: 20.0,
                i: 3.0,
                j: -4.0
            })
        );
        // a missing label makes the line malformed
        assert_eq!(parse_line("g2 x10 y20 i3"), None);
    }

    #[test]
    fn incomplete_positional_arc_is_malformed() {
        assert_eq!(parse_line("G2 10 10 10"), None);
    }
}
