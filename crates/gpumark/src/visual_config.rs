use std::fmt;
use std::str::FromStr;

use gpumark_common::parse_option_pairs;

/// Score given to a candidate whose native id differs from an explicitly
/// requested one.
const ID_MISMATCH_PENALTY: i32 = -1_000_000;

/// Pixel-format request or negotiated result.
///
/// Colour, depth and buffer fields use `1` for "don't care", stencil uses
/// `-1` and samples uses `0`. A nonzero `id` selects one exact native
/// configuration and every other field is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualConfig {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
    pub alpha: i32,
    pub depth: i32,
    pub stencil: i32,
    pub buffer: i32,
    pub samples: i32,
    pub id: i32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            red: 1,
            green: 1,
            blue: 1,
            alpha: 1,
            depth: 1,
            stencil: -1,
            buffer: 1,
            samples: 0,
            id: 0,
        }
    }
}

impl VisualConfig {
    pub fn new(red: i32, green: i32, blue: i32, alpha: i32, depth: i32, buffer: i32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
            depth,
            buffer,
            ..Self::default()
        }
    }

    /// Scores `self` (a candidate) against `requested`. Zero is a perfect
    /// match on every specified field, any deviation is negative and
    /// proportional to the distance.
    pub fn match_score(&self, requested: &VisualConfig) -> i32 {
        if requested.id != 0 {
            return if requested.id == self.id {
                0
            } else {
                ID_MISMATCH_PENALTY
            };
        }

        score_component(self.red, requested.red, 1)
            + score_component(self.green, requested.green, 1)
            + score_component(self.blue, requested.blue, 1)
            + score_component(self.alpha, requested.alpha, 1)
            + score_component(self.depth, requested.depth, 1)
            + score_component(self.buffer, requested.buffer, 1)
            + score_component(self.stencil, requested.stencil, -1)
            + score_component(self.samples, requested.samples, 0)
    }

    fn set_field(&mut self, key: &str, value: &str) -> bool {
        let Ok(value) = value.trim().parse::<i32>() else {
            return false;
        };

        let field = match key {
            "r" | "red" => &mut self.red,
            "g" | "green" => &mut self.green,
            "b" | "blue" => &mut self.blue,
            "a" | "alpha" => &mut self.alpha,
            "d" | "depth" => &mut self.depth,
            "s" | "stencil" => &mut self.stencil,
            "buf" | "buffer" => &mut self.buffer,
            "ms" | "samples" => &mut self.samples,
            "id" => &mut self.id,
            _ => return false,
        };
        *field = value;
        true
    }
}

fn score_component(candidate: i32, requested: i32, dont_care: i32) -> i32 {
    if requested == dont_care {
        0
    } else {
        -(requested - candidate).abs()
    }
}

impl FromStr for VisualConfig {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = VisualConfig::default();

        for (key, value) in parse_option_pairs(s) {
            if !config.set_field(&key, &value) {
                log::warn!(
                    "Ignoring invalid option string '{}={}' in visual config description",
                    key,
                    value
                );
            }
        }

        Ok(config)
    }
}

impl fmt::Display for VisualConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buf={} r={} g={} b={} a={} depth={} stencil={} samples={}",
            self.buffer, self.red, self.green, self.blue, self.alpha, self.depth, self.stencil,
            self.samples
        )?;
        if self.id != 0 {
            write!(f, " id=0x{:x}", self.id)?;
        }
        Ok(())
    }
}

/// A candidate picked by [`select_best_config`].
#[derive(Debug, Clone)]
pub struct Selection<T> {
    pub native: T,
    pub config: VisualConfig,
    pub score: i32,
}

/// Picks the candidate with the highest score; the earliest candidate wins
/// ties. A best score below zero means no candidate matched every requested
/// field: with `require_good` set that is a failure, otherwise the best
/// match is used and a warning is logged.
pub fn select_best_config<T, I>(
    candidates: I,
    requested: &VisualConfig,
    require_good: bool,
    api: &str,
) -> Option<Selection<T>>
where
    I: IntoIterator<Item = (T, VisualConfig)>,
{
    let mut best: Option<Selection<T>> = None;

    for (native, config) in candidates {
        let score = config.match_score(requested);
        log::debug!("[{}] candidate {} score {}", api, config, score);

        let better = match &best {
            Some(current) => score > current.score,
            None => true,
        };
        if better {
            best = Some(Selection {
                native,
                config,
                score,
            });
        }
    }

    let best = best?;

    if best.score < 0 {
        if require_good {
            log::error!(
                "[{}] No config matches the requested visual config ({}); best score {}",
                api,
                requested,
                best.score
            );
            return None;
        }
        log::warn!(
            "Unable to find a good {} config, will continue with the best match,\n\
             but you should verify that the config values are acceptable.\n\
             Tip: Use --visual-config to request a different config",
            api
        );
    }

    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba8888_d24() -> VisualConfig {
        VisualConfig::new(8, 8, 8, 8, 24, 32)
    }

    fn candidates() -> Vec<VisualConfig> {
        vec![
            VisualConfig::new(5, 6, 5, 0, 16, 16),
            VisualConfig::new(8, 8, 8, 0, 24, 24),
            VisualConfig::new(8, 8, 8, 8, 24, 32),
            VisualConfig::new(8, 8, 8, 8, 0, 32),
            VisualConfig::new(10, 10, 10, 2, 24, 32),
        ]
    }

    #[test]
    fn test_defaults_are_dont_care() {
        let vc = VisualConfig::default();
        assert_eq!((vc.red, vc.depth, vc.buffer), (1, 1, 1));
        assert_eq!(vc.stencil, -1);
        assert_eq!((vc.samples, vc.id), (0, 0));
    }

    #[test]
    fn test_parse_short_and_long_names() {
        let vc: VisualConfig = "r=5:green=6:b=5:a=0:d=16:s=8:buf=16:ms=4".parse().unwrap();
        assert_eq!(vc.red, 5);
        assert_eq!(vc.green, 6);
        assert_eq!(vc.alpha, 0);
        assert_eq!(vc.depth, 16);
        assert_eq!(vc.stencil, 8);
        assert_eq!(vc.buffer, 16);
        assert_eq!(vc.samples, 4);
    }

    #[test]
    fn test_parse_ignores_invalid_entries() {
        let vc: VisualConfig = "r=8:bogus=3:g=x:depth".parse().unwrap();
        assert_eq!(vc.red, 8);
        assert_eq!(vc.green, 1);
        assert_eq!(vc.depth, 1);
    }

    #[test]
    fn test_exact_match_scores_zero_others_negative() {
        let requested = rgba8888_d24();
        for candidate in candidates() {
            let score = candidate.match_score(&requested);
            if candidate == requested {
                assert_eq!(score, 0);
            } else {
                assert!(score < 0, "{} scored {}", candidate, score);
            }
        }
    }

    #[test]
    fn test_score_is_sum_of_distances() {
        let requested = rgba8888_d24();
        let candidate = VisualConfig::new(5, 6, 5, 0, 16, 16);
        assert_eq!(candidate.match_score(&requested), -(3 + 2 + 3 + 8 + 8 + 16));
    }

    #[test]
    fn test_dont_care_fields_contribute_nothing() {
        let requested = VisualConfig {
            red: 8,
            ..VisualConfig::default()
        };
        let a = VisualConfig {
            red: 8,
            green: 2,
            depth: 0,
            stencil: 8,
            samples: 16,
            ..VisualConfig::default()
        };
        let b = VisualConfig {
            red: 8,
            green: 10,
            depth: 32,
            stencil: 0,
            samples: 0,
            ..VisualConfig::default()
        };
        assert_eq!(a.match_score(&requested), 0);
        assert_eq!(b.match_score(&requested), 0);
    }

    #[test]
    fn test_stencil_and_samples_scored_when_requested() {
        let requested = VisualConfig {
            stencil: 8,
            samples: 4,
            ..VisualConfig::default()
        };
        let candidate = VisualConfig {
            stencil: 0,
            samples: 1,
            ..VisualConfig::default()
        };
        assert_eq!(candidate.match_score(&requested), -11);
    }

    #[test]
    fn test_id_trumps_other_fields() {
        let requested = VisualConfig {
            id: 0x21,
            red: 10,
            ..VisualConfig::default()
        };
        let matching = VisualConfig {
            id: 0x21,
            red: 5,
            ..VisualConfig::default()
        };
        let other = VisualConfig {
            id: 0x22,
            red: 10,
            ..VisualConfig::default()
        };
        assert_eq!(matching.match_score(&requested), 0);
        assert!(other.match_score(&requested) < matching.match_score(&requested));
    }

    #[test]
    fn test_selects_exact_match() {
        let requested = rgba8888_d24();
        let list: Vec<(usize, VisualConfig)> = candidates().into_iter().enumerate().collect();
        let best = select_best_config(list, &requested, true, "test").unwrap();
        assert_eq!(best.native, 2);
        assert_eq!(best.score, 0);
        assert_eq!(best.config, requested);
    }

    #[test]
    fn test_selection_independent_of_order() {
        let requested = VisualConfig::new(8, 8, 8, 0, 24, 1);
        let base = candidates();
        let expected = select_best_config(
            base.iter().copied().map(|c| (c, c)),
            &requested,
            false,
            "test",
        )
        .unwrap()
        .config;

        let mut rotated = base.clone();
        for _ in 0..rotated.len() {
            rotated.rotate_left(1);
            let best = select_best_config(
                rotated.iter().copied().map(|c| (c, c)),
                &requested,
                false,
                "test",
            )
            .unwrap();
            assert_eq!(best.config, expected);
        }

        let mut reversed = base;
        reversed.reverse();
        let best = select_best_config(
            reversed.iter().copied().map(|c| (c, c)),
            &requested,
            false,
            "test",
        )
        .unwrap();
        assert_eq!(best.config, expected);
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        let requested = VisualConfig::new(8, 8, 8, 8, 1, 1);
        let list = vec![
            ("first", VisualConfig::new(8, 8, 8, 8, 16, 32)),
            ("second", VisualConfig::new(8, 8, 8, 8, 24, 32)),
        ];
        let best = select_best_config(list, &requested, false, "test").unwrap();
        assert_eq!(best.native, "first");
    }

    #[test]
    fn test_fallback_without_good_config() {
        let requested = VisualConfig::new(16, 16, 16, 16, 32, 64);
        let list: Vec<(usize, VisualConfig)> = candidates().into_iter().enumerate().collect();
        let best = select_best_config(list, &requested, false, "test").unwrap();
        assert!(best.score < 0);
        assert_eq!(best.native, 2);
    }

    #[test]
    fn test_good_config_policy_fails_fast() {
        let requested = VisualConfig::new(16, 16, 16, 16, 32, 64);
        let list: Vec<(usize, VisualConfig)> = candidates().into_iter().enumerate().collect();
        assert!(select_best_config(list, &requested, true, "test").is_none());
    }

    #[test]
    fn test_empty_candidate_list() {
        let list: Vec<(usize, VisualConfig)> = Vec::new();
        assert!(select_best_config(list, &VisualConfig::default(), false, "test").is_none());
    }
}
