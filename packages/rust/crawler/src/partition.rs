//! Date-range partitioning into discovery windows.

use chrono::{Days, Months, NaiveDate};

use tribunal_shared::{DateWindow, Granularity, Result, TribunalError};

/// Splits an inclusive date range into contiguous windows.
#[derive(Debug, Clone, Copy)]
pub struct PartitionPlanner {
    granularity: Granularity,
}

impl PartitionPlanner {
    pub fn new(granularity: Granularity) -> Self {
        Self { granularity }
    }

    /// Plan windows covering `[start, end]` exactly, in order.
    ///
    /// The last window is clamped to `end`. `start == end` yields one window.
    pub fn plan(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DateWindow>> {
        if start > end {
            return Err(TribunalError::InvalidRange { start, end });
        }

        let mut windows = Vec::new();
        let mut current = start;

        loop {
            let natural_end = self.natural_end(current)?;
            let window_end = natural_end.min(end);

            windows.push(DateWindow {
                start: current,
                end: window_end,
                label: current.format("%Y-%m").to_string(),
            });

            if window_end >= end {
                break;
            }
            current = window_end
                .succ_opt()
                .ok_or_else(|| overflow(window_end))?;
        }

        Ok(windows)
    }

    /// Last day of the window starting at `start`, before clamping.
    fn natural_end(&self, start: NaiveDate) -> Result<NaiveDate> {
        let end = match self.granularity {
            Granularity::Daily => Some(start),
            Granularity::Weekly => start.checked_add_days(Days::new(6)),
            Granularity::Monthly => start
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt()),
        };
        end.ok_or_else(|| overflow(start))
    }
}

fn overflow(date: NaiveDate) -> TribunalError {
    TribunalError::validation(format!("date arithmetic overflow after {date}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Windows must tile the range with no gaps or overlaps.
    fn assert_tiles(windows: &[DateWindow], start: NaiveDate, end: NaiveDate) {
        assert_eq!(windows.first().unwrap().start, start);
        assert_eq!(windows.last().unwrap().end, end);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
        }
        for w in windows {
            assert!(w.start <= w.end);
        }
    }

    #[test]
    fn daily_week_yields_seven_windows() {
        let planner = PartitionPlanner::new(Granularity::Daily);
        let windows = planner.plan(d(2024, 1, 1), d(2024, 1, 7)).unwrap();
        assert_eq!(windows.len(), 7);
        assert!(windows.iter().all(|w| w.label == "2024-01" && w.days() == 1));
        assert_tiles(&windows, d(2024, 1, 1), d(2024, 1, 7));
    }

    #[test]
    fn monthly_clamps_last_window() {
        let planner = PartitionPlanner::new(Granularity::Monthly);
        let windows = planner.plan(d(2024, 1, 15), d(2024, 3, 10)).unwrap();
        let spans: Vec<_> = windows
            .iter()
            .map(|w| (w.start, w.end, w.label.as_str()))
            .collect();
        assert_eq!(
            spans,
            vec![
                (d(2024, 1, 15), d(2024, 2, 14), "2024-01"),
                (d(2024, 2, 15), d(2024, 3, 10), "2024-02"),
            ]
        );
    }

    #[test]
    fn monthly_from_month_start_follows_calendar() {
        let planner = PartitionPlanner::new(Granularity::Monthly);
        let windows = planner.plan(d(2024, 1, 1), d(2024, 12, 31)).unwrap();
        assert_eq!(windows.len(), 12);
        assert_eq!(windows[1].end, d(2024, 2, 29));
        assert_eq!(windows[11].label, "2024-12");
        assert_tiles(&windows, d(2024, 1, 1), d(2024, 12, 31));
    }

    #[test]
    fn weekly_tiles_range() {
        let planner = PartitionPlanner::new(Granularity::Weekly);
        let windows = planner.plan(d(2023, 12, 28), d(2024, 1, 20)).unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].label, "2023-12");
        assert_eq!(windows[1].label, "2024-01");
        assert_eq!(windows[3].days(), 3);
        assert_tiles(&windows, d(2023, 12, 28), d(2024, 1, 20));
    }

    #[test]
    fn single_day_range_yields_one_window() {
        for granularity in [Granularity::Daily, Granularity::Weekly, Granularity::Monthly] {
            let windows = PartitionPlanner::new(granularity)
                .plan(d(2024, 5, 5), d(2024, 5, 5))
                .unwrap();
            assert_eq!(windows.len(), 1);
            assert_eq!(windows[0].start, windows[0].end);
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = PartitionPlanner::new(Granularity::Daily)
            .plan(d(2024, 2, 1), d(2024, 1, 1))
            .unwrap_err();
        assert!(matches!(err, TribunalError::InvalidRange { .. }));
    }

    #[test]
    fn planning_is_deterministic() {
        let planner = PartitionPlanner::new(Granularity::Weekly);
        let a = planner.plan(d(2024, 1, 1), d(2024, 6, 30)).unwrap();
        let b = planner.plan(d(2024, 1, 1), d(2024, 6, 30)).unwrap();
        assert_eq!(a, b);
    }
}
