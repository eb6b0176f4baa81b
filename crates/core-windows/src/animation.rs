//! Window open/close animations.
//!
//! Animations are polled each frame against a millisecond monotonic
//! clock; there is no cancel path. Closing animations gate window
//! teardown: the window stays in the registry (and keeps rendering) until
//! `elapsed >= duration`, at which point the post-render sweep finalizes
//! it.

use core_protocol::WindowFlags;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationMode {
    FadeIn,
    FadeOut,
    SqueezeIn,
    SqueezeOut,
    /// Identity transform held for the duration, then gone. Used as the
    /// closing path for windows that opted out of animation.
    Disappear,
}

impl AnimationMode {
    pub fn duration_ms(self) -> u64 {
        match self {
            AnimationMode::FadeIn | AnimationMode::FadeOut => 256,
            AnimationMode::SqueezeIn | AnimationMode::SqueezeOut => 200,
            AnimationMode::Disappear => 100,
        }
    }

    pub fn is_closing(self) -> bool {
        matches!(
            self,
            AnimationMode::FadeOut | AnimationMode::SqueezeOut | AnimationMode::Disappear
        )
    }

    /// Choose the animation for a reveal (`closing == false`) or close,
    /// honoring the window's animation flags. `None` means no animation
    /// at all (opening a NO_ANIMATION window).
    pub fn pick(flags: WindowFlags, closing: bool) -> Option<AnimationMode> {
        if flags.contains(WindowFlags::DIALOG_ANIMATION) {
            return Some(if closing {
                AnimationMode::SqueezeOut
            } else {
                AnimationMode::SqueezeIn
            });
        }
        if flags.contains(WindowFlags::NO_ANIMATION) {
            return closing.then_some(AnimationMode::Disappear);
        }
        Some(if closing {
            AnimationMode::FadeOut
        } else {
            AnimationMode::FadeIn
        })
    }
}

/// A running animation: mode plus start timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Animation {
    pub mode: AnimationMode,
    pub started_ms: u64,
}

impl Animation {
    pub fn new(mode: AnimationMode, now_ms: u64) -> Self {
        Animation {
            mode,
            started_ms: now_ms,
        }
    }

    pub fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_ms)
    }

    pub fn expired(&self, now_ms: u64) -> bool {
        self.elapsed(now_ms) >= self.mode.duration_ms()
    }

    /// Animation phase in [0, 1]: 0 = fully hidden, 1 = fully shown.
    /// Closing modes run the phase backwards so one curve serves both
    /// directions.
    pub fn phase(&self, now_ms: u64) -> f64 {
        let dur = self.mode.duration_ms();
        if dur == 0 {
            return 1.0;
        }
        let t = self.elapsed(now_ms).min(dur) as f64 / dur as f64;
        if self.mode.is_closing() { 1.0 - t } else { t }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_honors_flags() {
        assert_eq!(
            AnimationMode::pick(WindowFlags::empty(), false),
            Some(AnimationMode::FadeIn)
        );
        assert_eq!(
            AnimationMode::pick(WindowFlags::empty(), true),
            Some(AnimationMode::FadeOut)
        );
        assert_eq!(
            AnimationMode::pick(WindowFlags::DIALOG_ANIMATION, true),
            Some(AnimationMode::SqueezeOut)
        );
        assert_eq!(AnimationMode::pick(WindowFlags::NO_ANIMATION, false), None);
        assert_eq!(
            AnimationMode::pick(WindowFlags::NO_ANIMATION, true),
            Some(AnimationMode::Disappear)
        );
    }

    #[test]
    fn expiry_is_inclusive_at_duration() {
        let anim = Animation::new(AnimationMode::FadeOut, 1000);
        let d = AnimationMode::FadeOut.duration_ms();
        assert!(!anim.expired(1000 + d - 1));
        assert!(anim.expired(1000 + d));
    }

    #[test]
    fn phase_runs_backwards_when_closing() {
        let opening = Animation::new(AnimationMode::FadeIn, 0);
        let closing = Animation::new(AnimationMode::FadeOut, 0);
        assert!(opening.phase(0) < 0.01);
        assert!(closing.phase(0) > 0.99);
        assert!(opening.phase(128) > 0.49 && opening.phase(128) < 0.51);
        assert!(closing.phase(256) < 0.01);
    }
}
