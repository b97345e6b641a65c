//! Property tests: unambiguous route sets always register, and lookups agree
//! with a brute-force scan ordered by pattern precedence.

use hermes_router::{Pattern, RouterBuilder, Segment};
use http::Method;
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("b".to_string()),
        Just("{p}".to_string()),
    ]
}

fn pattern() -> impl Strategy<Value = String> {
    (prop::collection::vec(segment(), 0..4), any::<bool>()).prop_map(|(segments, wildcard)| {
        let mut out = String::new();
        for (i, s) in segments.iter().enumerate() {
            out.push('/');
            if s == "{p}" {
                out.push_str(&format!("{{p{i}}}"));
            } else {
                out.push_str(s);
            }
        }
        if wildcard {
            out.push_str("/*rest");
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    })
}

fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop_oneof![Just("a"), Just("b"), Just("c")], 0..5)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

fn matches(pattern: &Pattern, path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let pattern = pattern.segments();
    for (i, seg) in pattern.iter().enumerate() {
        match seg {
            Segment::Literal(text) => {
                if segments.get(i) != Some(&text.as_str()) {
                    return false;
                }
            }
            Segment::Param(_) => {
                if segments.get(i).is_none() {
                    return false;
                }
            }
            Segment::Wildcard(_) => return segments.len() > i,
        }
    }
    segments.len() == pattern.len()
}

proptest! {
    #[test]
    fn unambiguous_sets_register_and_match_by_precedence(
        raw in prop::collection::vec(pattern(), 1..12),
        paths in prop::collection::vec(path(), 1..16),
    ) {
        let mut unique: Vec<Pattern> = Vec::new();
        for p in &raw {
            let parsed = Pattern::parse(p).unwrap();
            if !unique.iter().any(|u| u.same_shape(&parsed)) {
                unique.push(parsed);
            }
        }

        let mut builder = RouterBuilder::new();
        for (i, p) in unique.iter().enumerate() {
            prop_assert!(builder.register(Method::GET, p.as_str(), i).is_ok());
        }
        let router = builder.build();

        for path in &paths {
            let mut candidates: Vec<&Pattern> =
                unique.iter().filter(|p| matches(p, path)).collect();
            candidates.sort_by(|a, b| a.precedence(b));

            let found = router.match_route(&Method::GET, path);
            match candidates.first() {
                None => prop_assert!(found.is_none()),
                Some(expected) => {
                    let found = found.unwrap();
                    prop_assert_eq!(found.pattern, *expected);
                }
            }
        }
    }

    #[test]
    fn duplicate_shapes_always_conflict(p in pattern()) {
        let mut builder = RouterBuilder::new();
        builder.register(Method::PUT, &p, 0).unwrap();
        prop_assert!(builder.register(Method::PUT, &p, 1).is_err());
        prop_assert!(builder.register(Method::PATCH, &p, 2).is_ok());
    }
}
