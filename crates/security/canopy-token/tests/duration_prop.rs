//! Property tests for duration parsing.

use std::time::Duration;

use canopy_token::parse_duration;
use proptest::prelude::*;

proptest! {
    #[test]
    fn seconds_round_trip(n in 0u64..10_000_000) {
        let parsed = parse_duration(&format!("{n}s")).unwrap();
        prop_assert_eq!(parsed, Duration::from_secs(n));
    }

    #[test]
    fn bare_integers_mean_seconds(n in 0u64..10_000_000) {
        let parsed = parse_duration(&n.to_string()).unwrap();
        prop_assert_eq!(parsed, Duration::from_secs(n));
    }

    #[test]
    fn unit_scaling_is_consistent(n in 1u64..10_000) {
        let m = parse_duration(&format!("{n}m")).unwrap();
        let h = parse_duration(&format!("{n}h")).unwrap();
        let d = parse_duration(&format!("{n}d")).unwrap();
        prop_assert_eq!(m.as_secs(), n * 60);
        prop_assert_eq!(h.as_secs(), n * 3600);
        prop_assert_eq!(d.as_secs(), n * 86400);
    }

    #[test]
    fn arbitrary_junk_never_panics(s in "\\PC*") {
        let _ = parse_duration(&s);
    }
}
