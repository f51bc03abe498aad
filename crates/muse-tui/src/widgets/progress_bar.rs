//! Smooth Unicode playback progress bar.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::{C_MUTED, C_PLAYING, C_SECONDARY};

/// Render `position / duration` as a smooth bar with time labels on both
/// sides. Either value may still be unknown; the bar stays empty then.
pub fn draw_progress(
    frame: &mut Frame,
    area: Rect,
    position: Option<f64>,
    duration: Option<f64>,
) {
    if area.width < 12 || area.height == 0 {
        return;
    }

    let left_label = fmt_time(position.unwrap_or(0.0));
    let right_label = fmt_time(duration.unwrap_or(0.0));
    let label_w = (left_label.len() + right_label.len() + 2) as u16;
    let bar_w = area.width.saturating_sub(label_w).max(4) as usize;

    let progress = match (position, duration) {
        (Some(pos), Some(dur)) if dur > 0.0 => (pos / dur).clamp(0.0, 1.0),
        _ => 0.0,
    };

    // Unicode smooth fill: 8 eighths per cell.
    const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];
    let eighths = (progress * bar_w as f64 * 8.0) as usize;
    let full = eighths / 8;
    let partial = eighths % 8;

    let mut bar = String::with_capacity(bar_w + 4);
    bar.extend(std::iter::repeat('█').take(full));
    if full < bar_w {
        bar.push(BLOCKS[partial]);
        bar.extend(std::iter::repeat(' ').take(bar_w - full - 1));
    }

    let line = Line::from(vec![
        Span::styled(format!("{left_label} "), Style::default().fg(C_SECONDARY)),
        Span::styled(bar, Style::default().fg(C_PLAYING)),
        Span::styled(format!(" {right_label}"), Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// `m:ss` under an hour, `h:mm:ss` above.
pub fn fmt_time(secs: f64) -> String {
    if secs < 0.0 || !secs.is_finite() {
        return "0:00".to_string();
    }
    let s = secs as u64;
    let h = s / 3600;
    let m = (s % 3600) / 60;
    let s = s % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_time() {
        assert_eq!(fmt_time(0.0), "0:00");
        assert_eq!(fmt_time(61.4), "1:01");
        assert_eq!(fmt_time(3723.0), "1:02:03");
        assert_eq!(fmt_time(-5.0), "0:00");
        assert_eq!(fmt_time(f64::NAN), "0:00");
    }
}
