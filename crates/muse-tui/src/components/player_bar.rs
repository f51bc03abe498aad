//! Player bar — bottom strip with the current track, transport state,
//! progress, and volume.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use muse_core::library::Library;

use crate::player::Player;
use crate::theme::{
    style_muted, style_unfocused_border, C_ACCENT, C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY,
};
use crate::widgets::progress_bar::draw_progress;

pub fn draw_player_bar(frame: &mut Frame, area: Rect, player: &Player, library: &Library) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(style_unfocused_border());
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height == 0 {
        return;
    }

    let Some(track) = player.current_track(library) else {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                "nothing playing",
                style_muted(),
            ))),
            inner,
        );
        return;
    };

    // Line 1: transport icon, title, subtitle, volume readout.
    let icon = if player.is_playing() { "▶" } else { "⏸" };
    let volume = if player.muted() {
        "muted".to_string()
    } else {
        format!("vol {:>3.0}%", f64::from(player.volume()) * 100.0)
    };
    let nav = if player.can_navigate(library) {
        ""
    } else {
        "  (single track)"
    };

    let mut spans = vec![
        Span::styled(
            format!(" {icon} "),
            Style::default().fg(C_PLAYING).add_modifier(Modifier::BOLD),
        ),
        Span::styled(track.display_title().to_string(), Style::default().fg(C_PRIMARY)),
    ];
    let subtitle = track.display_subtitle();
    if !subtitle.is_empty() {
        spans.push(Span::styled(
            format!("  {subtitle}"),
            Style::default().fg(C_SECONDARY),
        ));
    }
    spans.push(Span::styled(nav.to_string(), style_muted()));

    let volume_span = Span::styled(
        volume,
        if player.muted() {
            Style::default().fg(C_MUTED)
        } else {
            Style::default().fg(C_ACCENT)
        },
    );
    let volume_w = 9u16.min(inner.width);
    let info_area = Rect::new(inner.x, inner.y, inner.width.saturating_sub(volume_w), 1);
    let volume_area = Rect::new(
        inner.x + inner.width.saturating_sub(volume_w),
        inner.y,
        volume_w,
        1,
    );
    frame.render_widget(Paragraph::new(Line::from(spans)), info_area);
    frame.render_widget(
        Paragraph::new(Line::from(volume_span)).right_aligned(),
        volume_area,
    );

    // Line 2: progress. Falls back to the track's reported duration for the
    // label while the backend has not observed one yet.
    if inner.height >= 2 {
        let progress_area = Rect::new(inner.x + 1, inner.y + 1, inner.width.saturating_sub(2), 1);
        let duration = player.duration_secs().or(track.duration);
        draw_progress(frame, progress_area, player.position_secs(), duration);
    }
}
