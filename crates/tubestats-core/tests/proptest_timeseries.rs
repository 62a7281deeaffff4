use proptest::prelude::*;
use tubestats_core::timeseries::TimeSeries;

#[path = "generators.rs"]
mod generators;
use generators::*;

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(2000))]

    #[test]
    fn head_and_tail_scans_agree(samples in arb_samples(40), queries in prop::collection::vec(arb_ts(), 1..30)) {
        let mut series = TimeSeries::new();
        for (at, value) in &samples {
            series.insert(*at, *value);
        }
        for ts in queries {
            prop_assert_eq!(series.resolve_from_head(ts), series.resolve_from_tail(ts));
            prop_assert_eq!(series.resolve_at(ts), series.resolve_from_head(ts));
        }
    }

    #[test]
    fn timestamps_increase_and_values_change(samples in arb_samples(40)) {
        let mut series = TimeSeries::new();
        for (at, value) in &samples {
            series.insert(*at, *value);
        }
        let points: Vec<_> = series.iter().collect();
        prop_assert_eq!(points.len(), series.len());
        for pair in points.windows(2) {
            prop_assert!(pair[0].at < pair[1].at);
            prop_assert_ne!(pair[0].value, pair[1].value);
        }
        prop_assert_eq!(series.earliest(), points.first().map(|s| s.at));
        prop_assert_eq!(series.latest(), points.last().map(|s| s.at));
    }

    #[test]
    fn in_order_inserts_match_step_function(mut samples in arb_samples(40), queries in prop::collection::vec(arb_ts(), 1..30)) {
        samples.sort_by_key(|(at, _)| *at);
        samples.dedup_by_key(|(at, _)| *at);

        let mut series = TimeSeries::new();
        for (at, value) in &samples {
            series.insert(*at, *value);
        }
        for ts in queries {
            let expected = samples.iter().take_while(|(at, _)| *at <= ts).last().map(|(_, v)| *v);
            prop_assert_eq!(series.resolve_at(ts), expected);
        }
    }
}
