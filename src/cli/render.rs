//! Terminal rendering of batch event streams.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::services::batch::{BatchEvent, EventStream};

/// Consume a session's events until the terminal event, rendering progress
/// with a bar and everything else as styled lines.
///
/// Returns an error when the session ends with a terminal `Error` event.
pub async fn render_events(mut stream: EventStream) -> anyhow::Result<()> {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = stream.next().await {
        match event {
            BatchEvent::Progress {
                current,
                total,
                message,
                ..
            } => {
                let pb = bar.get_or_insert_with(|| {
                    let pb = ProgressBar::new(total as u64);
                    pb.set_style(
                        ProgressStyle::with_template(
                            "{bar:30.cyan/dim} {pos}/{len} {wide_msg}",
                        )
                        .expect("static template"),
                    );
                    pb
                });
                pb.set_length(total as u64);
                pb.set_position(current as u64);
                pb.set_message(message);
            }
            BatchEvent::Status { message } => {
                print_above(&bar, &format!("  {}", style(message).dim()));
            }
            BatchEvent::Info { message } => {
                print_above(&bar, &format!("{}", style(message).cyan()));
            }
            BatchEvent::Warning { message } => {
                print_above(&bar, &format!("{}", style(message).yellow()));
            }
            BatchEvent::Success { message } => {
                print_above(&bar, &format!("{}", style(message).green()));
            }
            BatchEvent::Complete {
                message,
                folder,
                stats,
            } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                println!("{}", style(message).green().bold());
                println!("  folder: {folder}");
                println!(
                    "  totals: {} complete, {} partial, {} failed, {} restricted, {} skipped",
                    stats.complete, stats.partial, stats.failed, stats.restricted, stats.skipped
                );
            }
            BatchEvent::Error { message } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                anyhow::bail!("{message}");
            }
            BatchEvent::Keepalive => {}
        }
    }

    Ok(())
}

fn print_above(bar: &Option<ProgressBar>, line: &str) {
    match bar {
        Some(pb) => pb.println(line),
        None => println!("{line}"),
    }
}
