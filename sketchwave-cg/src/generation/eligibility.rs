//! Board eligibility filtering
//!
//! A board is analyzable when it carries a non-trivial image payload or
//! enough strokes that a thumbnail must exist upstream. The filter preserves
//! submission order and caps the result at `MAX_BOARDS`; boards past the cap
//! are silently dropped.

use crate::types::BoardSubmission;
use base64::Engine;
use tracing::debug;

/// Maximum number of boards analyzed per run
pub const MAX_BOARDS: usize = 4;

/// Minimum stroke count for image-less eligibility
pub const MIN_STROKES: u32 = 5;

/// Minimum decoded image size considered non-trivial
pub const MIN_IMAGE_BYTES: usize = 1024;

/// Decode a board image payload, tolerating data-URL prefixes
///
/// Returns None for undecodable input; an unreadable image downgrades the
/// board to the stroke-count rule rather than failing the request.
pub fn decode_image_payload(payload: &str) -> Option<Vec<u8>> {
    let encoded = match payload.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => payload,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()
}

/// True when the board qualifies for vision analysis
fn is_eligible(board: &BoardSubmission) -> bool {
    let has_image = board
        .image
        .as_ref()
        .map(|bytes| bytes.len() >= MIN_IMAGE_BYTES)
        .unwrap_or(false);
    has_image || board.stroke_count >= MIN_STROKES
}

/// Filter submitted boards down to the analyzable subset
///
/// Output preserves input order and holds at most `MAX_BOARDS` entries.
/// An empty result is the caller's `NoEligibleBoards` condition.
pub fn eligible_boards(boards: Vec<BoardSubmission>) -> Vec<BoardSubmission> {
    let total = boards.len();
    let mut eligible: Vec<BoardSubmission> = boards.into_iter().filter(is_eligible).collect();
    if eligible.len() > MAX_BOARDS {
        debug!(
            eligible = eligible.len(),
            cap = MAX_BOARDS,
            "Truncating eligible boards to cap"
        );
        eligible.truncate(MAX_BOARDS);
    }
    debug!(submitted = total, eligible = eligible.len(), "Eligibility filter complete");
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(id: &str, image_len: Option<usize>, strokes: u32) -> BoardSubmission {
        BoardSubmission {
            id: id.to_string(),
            name: None,
            image: image_len.map(|n| vec![0u8; n]),
            stroke_count: strokes,
        }
    }

    #[test]
    fn image_above_threshold_is_eligible() {
        let result = eligible_boards(vec![board("a", Some(MIN_IMAGE_BYTES), 0)]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn tiny_image_needs_strokes() {
        assert!(eligible_boards(vec![board("a", Some(16), 0)]).is_empty());
        assert_eq!(eligible_boards(vec![board("a", Some(16), 5)]).len(), 1);
    }

    #[test]
    fn stroke_count_threshold_is_inclusive() {
        assert!(eligible_boards(vec![board("a", None, 4)]).is_empty());
        assert_eq!(eligible_boards(vec![board("a", None, 5)]).len(), 1);
    }

    #[test]
    fn cap_keeps_first_four_in_order() {
        let boards = (0..6)
            .map(|i| board(&format!("b{}", i), None, 10))
            .collect();
        let result = eligible_boards(boards);
        assert_eq!(result.len(), MAX_BOARDS);
        let ids: Vec<&str> = result.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b0", "b1", "b2", "b3"]);
    }

    #[test]
    fn ineligible_boards_do_not_consume_cap_slots() {
        let boards = vec![
            board("skip", None, 0),
            board("b1", None, 10),
            board("skip2", Some(8), 1),
            board("b2", Some(2048), 0),
        ];
        let result = eligible_boards(boards);
        let ids: Vec<&str> = result.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[test]
    fn decodes_plain_and_data_url_base64() {
        let plain = base64::engine::general_purpose::STANDARD.encode(b"hello");
        assert_eq!(decode_image_payload(&plain).unwrap(), b"hello");

        let data_url = format!("data:image/png;base64,{}", plain);
        assert_eq!(decode_image_payload(&data_url).unwrap(), b"hello");
    }

    #[test]
    fn garbage_base64_is_none() {
        assert!(decode_image_payload("!!!not base64!!!").is_none());
    }
}
