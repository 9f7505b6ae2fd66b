//! Turning lines of input into submitted votes

use ballot_common::{Signal, Vote, internal};
use ballot_delivery::Producer;
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::broadcast,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("Expected 'election,candidate' but found '{0}'")]
    Malformed(String),

    #[error("Empty {field} in '{line}'")]
    EmptyField { field: &'static str, line: String },
}

/// Parse one `election,candidate` line into a vote cast on `machine`
///
/// Blank lines and lines starting with `#` yield `None`.
///
/// # Errors
/// If the line does not have exactly two non-empty fields
pub fn parse_line(line: &str, machine: &str) -> Result<Option<Vote>, FeedError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split(',').map(str::trim);
    let (Some(election), Some(candidate), None) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(FeedError::Malformed(line.to_string()));
    };

    for (field, value) in [("election", election), ("candidate", candidate)] {
        if value.is_empty() {
            return Err(FeedError::EmptyField {
                field,
                line: line.to_string(),
            });
        }
    }

    Ok(Some(Vote::new(election, candidate, machine)))
}

/// Submit a vote for every valid line read from `input`
///
/// Stops at end of input or on shutdown. Invalid lines are logged and
/// skipped. Returns the number of votes submitted.
pub async fn feed_votes<R>(
    input: R,
    producer: &Producer,
    machine: &str,
    mut shutdown: broadcast::Receiver<Signal>,
) -> usize
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut lines = input.lines();
    let mut submitted = 0;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.recv() => break,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                internal!(level = INFO, "Vote input closed after {submitted} votes");
                break;
            }
            Err(e) => {
                internal!(level = ERROR, "Unable to read votes: {e}");
                break;
            }
        };

        match parse_line(&line, machine) {
            Ok(Some(vote)) => match vote.to_payload() {
                Ok(payload) => {
                    let id = producer.submit(payload).await;
                    internal!(
                        level = INFO,
                        "Vote for {} in {} submitted as {id}",
                        vote.candidate,
                        vote.election
                    );
                    submitted += 1;
                }
                Err(e) => internal!(level = ERROR, "Unable to encode vote: {e}"),
            },
            Ok(None) => {}
            Err(e) => internal!(level = WARN, "Skipping input: {e}"),
        }
    }

    submitted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let vote = parse_line(" mayor , alice ", "booth-1")
            .expect("parse")
            .expect("vote");

        assert_eq!(vote.election, "mayor");
        assert_eq!(vote.candidate, "alice");
        assert_eq!(vote.machine, "booth-1");
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("", "m"), Ok(None));
        assert_eq!(parse_line("   ", "m"), Ok(None));
        assert_eq!(parse_line("# mayor,alice", "m"), Ok(None));
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(parse_line("mayor", "m"), Err(FeedError::Malformed(_))));
        assert!(matches!(
            parse_line("mayor,alice,bob", "m"),
            Err(FeedError::Malformed(_))
        ));
        assert!(matches!(
            parse_line("mayor, ", "m"),
            Err(FeedError::EmptyField {
                field: "candidate",
                ..
            })
        ));
        assert!(matches!(
            parse_line(",alice", "m"),
            Err(FeedError::EmptyField {
                field: "election",
                ..
            })
        ));
    }
}
