use tokio::sync::mpsc;

use linkrot_core::ProgressEvent;

/// Drains the progress stream to stdout (§4.11). One line per checked URL;
/// broken links get their category appended so a human tailing the output
/// doesn't need `--json` to see what's wrong. `--verbose-network` itself is
/// consumed upstream in the checker (transport error messages carry elapsed
/// duration and the failing operation); this consumer just prints whatever
/// message it's handed.
pub async fn run(mut progress_rx: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = progress_rx.recv().await {
        if event.status == 0 && event.error_message.is_empty() {
            continue;
        }

        match event.error_category {
            Some(category) => println!(
                "[{}] BROKEN {} ({}) {}",
                event.checked_count,
                event.url,
                category.as_str(),
                event.error_message
            ),
            None => println!("[{}] OK {}", event.checked_count, event.url),
        }
    }
}
