//! Scroll corrections for the conversation viewport.
//!
//! The anchor never touches a viewport itself. It decides *whether* and
//! *when* to scroll and hands back a [`ScheduledScroll`]; the caller waits
//! out the settle delay (layout needs a frame or two), reads fresh
//! [`Viewport`] metrics and calls [`ScrollAnchor::fire`], which yields the
//! [`ScrollCommand`] to apply. Every schedule is stamped with the anchor's
//! generation, so work scheduled for a previous contact fires as a no-op.

use crate::config::{PagingConfig, ScrollConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Viewport metrics in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
    pub width: f64,
}

impl Viewport {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Touch,
    Pointer,
}

impl InputKind {
    pub fn for_width(width: f64, config: &PagingConfig) -> Self {
        if width < config.touch_breakpoint_width {
            InputKind::Touch
        } else {
            InputKind::Pointer
        }
    }

    /// Touch viewports also load history when the top sentinel shows up.
    pub fn uses_sentinel(self) -> bool {
        self == InputKind::Touch
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollCommand {
    ScrollToBottom,
    SetOffset(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    Initial,
    FollowAppend,
    /// Restore the anchor after older content was inserted above it.
    Prepend { previous_height: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledScroll {
    pub generation: u64,
    pub delay: Duration,
    pub action: ScrollAction,
}

#[derive(Debug)]
pub struct ScrollAnchor {
    config: ScrollConfig,
    generation: u64,
    is_initial_load: bool,
    previous_content_height: Option<f64>,
}

impl ScrollAnchor {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            config,
            generation: 0,
            is_initial_load: true,
            previous_content_height: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_initial_load(&self) -> bool {
        self.is_initial_load
    }

    pub fn previous_content_height(&self) -> Option<f64> {
        self.previous_content_height
    }

    /// Contact switch: back to first-load behavior, pending schedules void.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.is_initial_load = true;
        self.previous_content_height = None;
    }

    fn schedule(&self, delay: Duration, action: ScrollAction) -> ScheduledScroll {
        ScheduledScroll {
            generation: self.generation,
            delay,
            action,
        }
    }

    pub fn on_initial_loaded(&self) -> ScheduledScroll {
        self.schedule(self.config.initial_settle(), ScrollAction::Initial)
    }

    /// Records content height `H0` right before older messages are
    /// requested.
    pub fn before_prepend(&mut self, content_height: f64) {
        self.previous_content_height = Some(content_height);
    }

    pub fn on_prepended(&mut self) -> Option<ScheduledScroll> {
        let previous_height = self.previous_content_height.take()?;
        Some(self.schedule(
            self.config.prepend_settle(),
            ScrollAction::Prepend { previous_height },
        ))
    }

    /// A load-more that failed leaves nothing to restore.
    pub fn cancel_prepend(&mut self) {
        self.previous_content_height = None;
    }

    /// `before` is the viewport as it was before the new message rendered.
    /// Follows the conversation only when the user was already near the
    /// bottom. During the first load the pending initial scroll covers it.
    pub fn on_live_append(&self, before: &Viewport) -> Option<ScheduledScroll> {
        if self.is_initial_load {
            return None;
        }
        if before.distance_from_bottom() < self.config.near_bottom {
            Some(self.schedule(self.config.append_settle(), ScrollAction::FollowAppend))
        } else {
            None
        }
    }

    /// Resolves a scheduled scroll against the viewport as it is now.
    pub fn fire(&mut self, scheduled: &ScheduledScroll, now: &Viewport) -> Option<ScrollCommand> {
        if scheduled.generation != self.generation {
            log::debug!(
                "scroll: dropping {:?} from generation {} (current {})",
                scheduled.action,
                scheduled.generation,
                self.generation
            );
            return None;
        }
        match scheduled.action {
            ScrollAction::Initial => {
                self.is_initial_load = false;
                Some(ScrollCommand::ScrollToBottom)
            }
            ScrollAction::FollowAppend => Some(ScrollCommand::ScrollToBottom),
            ScrollAction::Prepend { previous_height } => {
                let delta = now.scroll_height - previous_height;
                (delta > 0.0).then(|| ScrollCommand::SetOffset(now.scroll_top + delta))
            }
        }
    }
}
