//! Per-board brief generation (fan-out)
//!
//! Issues one vision-language call per eligible board. Calls share no state
//! and run concurrently; results are written back by board index so the
//! output order always matches submission order regardless of completion
//! order. Per-board failures are captured on the brief itself and never
//! abort sibling calls.

use crate::clients::VisionAnalyzer;
use crate::types::{BoardSubmission, Brief};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Instruction template for analyzing one board image
fn brief_instruction(segment_secs: u32) -> String {
    format!(
        "You are a music director. Look at this sketch and describe, in 2-4 \
         sentences of plain prose, a piece of music it evokes: mood, genre, \
         rough tempo, lead instrumentation, and how the piece should evolve \
         over its duration. The piece lasts {} seconds. Do not mention the \
         sketch itself, only the music.",
        segment_secs
    )
}

/// Instruction for a board that qualified by stroke count but has no image
fn strokes_instruction(board: &BoardSubmission, segment_secs: u32) -> String {
    format!(
        "You are a music director. A user drew an abstract sketch of {} \
         strokes named \"{}\". Describe, in 2-4 sentences of plain prose, a \
         piece of music such a sketch could evoke: mood, genre, rough tempo, \
         lead instrumentation, and how the piece should evolve. The piece \
         lasts {} seconds.",
        board.stroke_count,
        board.name.as_deref().unwrap_or("untitled"),
        segment_secs
    )
}

/// Analyze one board, capturing any failure in the returned brief
async fn analyze_board(
    vision: Arc<dyn VisionAnalyzer>,
    board: BoardSubmission,
    segment_secs: u32,
    cancel: CancellationToken,
) -> Brief {
    let call = async {
        match &board.image {
            Some(image) => {
                vision
                    .describe_image(image, &brief_instruction(segment_secs))
                    .await
            }
            None => {
                vision
                    .generate_text(&strokes_instruction(&board, segment_secs))
                    .await
            }
        }
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => Err(crate::clients::VisionError::Network(
            "analysis cancelled".to_string(),
        )),
        result = call => result,
    };

    match result {
        Ok(text) => {
            debug!(board_id = %board.id, "Board analysis complete");
            Brief {
                canvas_id: board.id,
                canvas_name: board.name,
                text: Some(text),
                error: None,
                segment_duration_seconds: segment_secs,
            }
        }
        Err(e) => {
            warn!(board_id = %board.id, error = %e, "Board analysis failed (continuing batch)");
            Brief {
                canvas_id: board.id,
                canvas_name: board.name,
                text: None,
                error: Some(e.to_string()),
                segment_duration_seconds: segment_secs,
            }
        }
    }
}

/// Generate one brief per board, concurrently, preserving board order
///
/// Tasks are spawned indexed by position and results read back by index,
/// never by completion order. A panicked task degrades to an errored brief
/// for that board only.
pub async fn generate_briefs(
    vision: &Arc<dyn VisionAnalyzer>,
    boards: &[BoardSubmission],
    segment_secs: u32,
    cancel: &CancellationToken,
) -> Vec<Brief> {
    let mut handles = Vec::with_capacity(boards.len());
    for (index, board) in boards.iter().enumerate() {
        let vision = Arc::clone(vision);
        let board = board.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            (index, analyze_board(vision, board, segment_secs, cancel).await)
        }));
    }

    let mut briefs: Vec<Option<Brief>> = (0..boards.len()).map(|_| None).collect();
    for (slot, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok((index, brief)) => briefs[index] = Some(brief),
            Err(e) => {
                let board = &boards[slot];
                warn!(board_id = %board.id, error = %e, "Board analysis task panicked");
                briefs[slot] = Some(Brief {
                    canvas_id: board.id.clone(),
                    canvas_name: board.name.clone(),
                    text: None,
                    error: Some(format!("analysis task failed: {}", e)),
                    segment_duration_seconds: segment_secs,
                });
            }
        }
    }

    briefs.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::VisionError;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Mock analyzer: echoes the image length, sleeping longer for larger
    /// images so completion order is the reverse of submission order.
    struct SkewedVision;

    #[async_trait]
    impl VisionAnalyzer for SkewedVision {
        async fn describe_image(
            &self,
            image: &[u8],
            _instruction: &str,
        ) -> Result<String, VisionError> {
            tokio::time::sleep(Duration::from_millis(image.len() as u64 / 100)).await;
            Ok(format!("brief for {} bytes", image.len()))
        }

        async fn generate_text(&self, _instruction: &str) -> Result<String, VisionError> {
            Ok("strokes brief".to_string())
        }
    }

    /// Mock analyzer that fails for boards whose image is exactly 13 bytes
    struct FlakyVision;

    #[async_trait]
    impl VisionAnalyzer for FlakyVision {
        async fn describe_image(
            &self,
            image: &[u8],
            _instruction: &str,
        ) -> Result<String, VisionError> {
            if image.len() == 13 {
                Err(VisionError::EmptyText)
            } else {
                Ok("ok".to_string())
            }
        }

        async fn generate_text(&self, _instruction: &str) -> Result<String, VisionError> {
            Ok("ok".to_string())
        }
    }

    fn board(id: &str, image_len: Option<usize>) -> BoardSubmission {
        BoardSubmission {
            id: id.to_string(),
            name: None,
            image: image_len.map(|n| vec![0u8; n]),
            stroke_count: 6,
        }
    }

    #[tokio::test]
    async fn briefs_preserve_board_order_under_completion_skew() {
        let vision: Arc<dyn VisionAnalyzer> = Arc::new(SkewedVision);
        let cancel = CancellationToken::new();
        // First board sleeps longest, so it completes last
        let boards = vec![
            board("slow", Some(8000)),
            board("medium", Some(4000)),
            board("fast", Some(100)),
        ];

        let briefs = generate_briefs(&vision, &boards, 20, &cancel).await;

        let ids: Vec<&str> = briefs.iter().map(|b| b.canvas_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "medium", "fast"]);
        assert_eq!(briefs[0].text.as_deref(), Some("brief for 8000 bytes"));
        assert!(briefs.iter().all(|b| b.segment_duration_seconds == 20));
    }

    #[tokio::test]
    async fn failures_are_captured_per_brief() {
        let vision: Arc<dyn VisionAnalyzer> = Arc::new(FlakyVision);
        let cancel = CancellationToken::new();
        let boards = vec![
            board("good", Some(2048)),
            board("bad", Some(13)),
            board("also-good", Some(2048)),
        ];

        let briefs = generate_briefs(&vision, &boards, 20, &cancel).await;

        assert_eq!(briefs.len(), 3);
        assert!(briefs[0].error.is_none());
        assert!(briefs[1].text.is_none());
        assert!(briefs[1].error.is_some());
        assert!(briefs[2].error.is_none());
    }

    #[tokio::test]
    async fn image_less_board_uses_text_call() {
        let vision: Arc<dyn VisionAnalyzer> = Arc::new(SkewedVision);
        let cancel = CancellationToken::new();
        let briefs = generate_briefs(&vision, &[board("s", None)], 60, &cancel).await;
        assert_eq!(briefs[0].text.as_deref(), Some("strokes brief"));
    }
}
