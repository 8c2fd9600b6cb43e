//! Drawable window maintenance over the time axis.
//!
//! The window is a two-pointer range `[first, last)` into the time axis that
//! always spans the most recent `drawable_seconds`. It only ever moves right.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Index bounds of the data currently eligible for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawableWindow {
    /// Oldest index still inside the display interval
    pub first: usize,
    /// Index of the latest complete tick (exclusive bound of the range)
    pub last: usize,
}

impl DrawableWindow {
    /// Half-open index range `[first, last)`.
    pub fn range(&self) -> Range<usize> {
        self.first..self.last
    }

    pub fn len(&self) -> usize {
        self.last - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }
}

/// Advances the drawable window as ticks complete.
#[derive(Debug, Clone)]
pub struct WindowManager {
    /// `t_drawable`: width of the window in seconds
    drawable_seconds: f64,
    /// `None` until the first complete tick
    window: Option<DrawableWindow>,
}

impl WindowManager {
    pub fn new(drawable_seconds: f64) -> Self {
        Self {
            drawable_seconds,
            window: None,
        }
    }

    /// Move `last` to the newest tick of `time`, then pull `first` forward
    /// until the window spans at most `drawable_seconds`.
    pub fn advance(&mut self, time: &[f64]) {
        let Some(newest) = time.len().checked_sub(1) else {
            return;
        };

        let (mut first, last) = match self.window {
            Some(w) if w.last >= newest => return,
            Some(w) => (w.first, newest),
            None => (0, newest),
        };

        while first < last && time[first] < time[last] - self.drawable_seconds {
            first += 1;
        }

        self.window = Some(DrawableWindow { first, last });
    }

    /// Current window, or `None` while not yet ready.
    pub fn window(&self) -> Option<DrawableWindow> {
        self.window
    }

    pub fn is_ready(&self) -> bool {
        self.window.is_some()
    }

    pub fn drawable_seconds(&self) -> f64 {
        self.drawable_seconds
    }

    /// Back to the not-ready state.
    pub fn reset(&mut self) {
        self.window = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_until_first_advance() {
        let mut manager = WindowManager::new(1.0);
        assert!(!manager.is_ready());

        manager.advance(&[]);
        assert_eq!(manager.window(), None);

        manager.advance(&[0.0]);
        assert_eq!(manager.window(), Some(DrawableWindow { first: 0, last: 0 }));
        assert!(manager.window().unwrap().is_empty());
    }

    #[test]
    fn test_window_slides_and_stays_tight() {
        let mut manager = WindowManager::new(1.0);
        let mut time = Vec::new();

        for i in 0..100 {
            time.push(i as f64 * 0.125);
            manager.advance(&time);

            let w = manager.window().unwrap();
            assert_eq!(w.last, i);
            assert!(time[w.last] - time[w.first] <= 1.0);
            if w.first > 0 {
                // one step further left would exceed the bound
                assert!(time[w.last] - time[w.first - 1] > 1.0);
            }
        }
        let w = manager.window().unwrap();
        assert_eq!(w.last - w.first, 8);
    }

    #[test]
    fn test_catches_up_over_several_ticks() {
        let mut manager = WindowManager::new(0.5);
        let time: Vec<f64> = (0..20).map(|i| i as f64 * 0.125).collect();

        manager.advance(&time[..2]);
        assert_eq!(manager.window(), Some(DrawableWindow { first: 0, last: 1 }));

        manager.advance(&time);
        let w = manager.window().unwrap();
        assert_eq!(w.last, 19);
        assert_eq!(w.first, 15);
        assert_eq!(w.range(), 15..19);
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_never_moves_left() {
        let mut manager = WindowManager::new(0.5);
        let time: Vec<f64> = (0..10).map(|i| i as f64 * 0.125).collect();
        manager.advance(&time);
        let before = manager.window().unwrap();

        manager.advance(&time[..3]);
        assert_eq!(manager.window().unwrap(), before);

        manager.reset();
        assert!(!manager.is_ready());
    }
}
