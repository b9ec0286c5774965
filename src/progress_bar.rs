//! Progress reporting for the long loops of the linker (`progress` feature).
//!
//! Components
//! -----------------
//! * [`IterTimer`] – per-iteration durations smoothed with an exponential moving average,
//!   `ema ← α·dt + (1–α)·ema`. The first tick initializes the average.
//! * [`fmt_dur`] – formats a [`Duration`] as `"253µs"`, `"42ms"` or `"3.14s"`.
//! * [`LoopProgress`] – an [`indicatif`] bar driven by an [`IterTimer`]; call
//!   [`LoopProgress::step`] once per iteration and [`LoopProgress::finish`] at the end.
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}";

pub(crate) struct IterTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

impl IterTimer {
    pub(crate) fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha,
            count: 0,
        }
    }

    #[inline]
    pub(crate) fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };
        dt
    }

    #[inline]
    pub(crate) fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }
}

#[inline]
pub(crate) fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else if d.as_millis() < 1_000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f32())
    }
}

/// Progress bar over a loop of known length.
pub(crate) struct LoopProgress {
    pb: ProgressBar,
    timer: IterTimer,
}

impl LoopProgress {
    pub(crate) fn new(total: u64) -> Self {
        let pb = ProgressBar::new(total.max(1));
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(200));
        LoopProgress {
            pb,
            timer: IterTimer::new(0.2),
        }
    }

    /// Record the end of the previous iteration (zero-cost for the first one).
    pub(crate) fn step(&mut self) {
        let last = self.timer.tick();
        let avg = self.timer.avg();
        self.pb
            .set_message(format!("last: {}, avg: {}", fmt_dur(last), fmt_dur(avg)));
        self.pb.inc(1);
    }

    pub(crate) fn finish(self) {
        self.pb.finish_and_clear();
    }
}

#[cfg(test)]
mod progress_bar_test {
    use super::*;

    #[test]
    fn test_fmt_dur_scales() {
        assert_eq!(fmt_dur(Duration::from_micros(253)), "253µs");
        assert_eq!(fmt_dur(Duration::from_millis(42)), "42ms");
        assert_eq!(fmt_dur(Duration::from_millis(3140)), "3.14s");
    }

    #[test]
    fn test_timer_first_tick_sets_average() {
        let mut timer = IterTimer::new(0.2);
        assert_eq!(timer.avg(), Duration::ZERO);
        let dt = timer.tick();
        assert_eq!(timer.avg().as_nanos(), dt.as_nanos());
    }
}
