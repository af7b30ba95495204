//! Tests for neuralbreach-engine: generation, matching, scoring, stability,
//! difficulty, block bookkeeping, session aggregation, config and audio

use chrono::{Duration as ChronoDuration, Utc};
use neuralbreach_core::*;
use neuralbreach_engine::aggregator::{self, accuracy_percent};
use neuralbreach_engine::audio::{self, AudioError, AudioResult};
use neuralbreach_engine::difficulty::next_level;
use neuralbreach_engine::evaluator::{evaluate, FALSE_ALARM_PENALTY, MISS_PENALTY};
use neuralbreach_engine::oracle::{has_audio_match, has_position_match};
use neuralbreach_engine::*;
use std::sync::atomic::{AtomicU32, Ordering};

fn level(n: u8) -> NLevel {
    NLevel::new(n).unwrap()
}

fn stim(position: u8, letter: Letter) -> Stimulus {
    Stimulus::new(GridPosition::new(position).unwrap(), letter)
}

// ===========================================================================
// StimulusGenerator
// ===========================================================================

#[test]
fn generator_returns_twenty_stimuli_for_every_level() {
    let mut generator = StimulusGenerator::seeded(1);
    for n in 1..=5u8 {
        let sequence = generator.generate_block(n, 1).unwrap();
        assert_eq!(sequence.len(), TRIALS_PER_BLOCK);
        for i in 0..n as usize {
            assert!(!has_position_match(&sequence, i, level(n)));
            assert!(!has_audio_match(&sequence, i, level(n)));
        }
    }
}

#[test]
fn generator_rejects_invalid_levels() {
    let mut generator = StimulusGenerator::seeded(1);
    for bad in [0u8, 6, 42] {
        match generator.generate_block(bad, 1) {
            Err(Error::InvalidLevel { level, .. }) => assert_eq!(level, bad),
            other => panic!("expected InvalidLevel for {bad}, got {:?}", other),
        }
    }
}

#[test]
fn generator_is_deterministic_for_a_seed() {
    let a = StimulusGenerator::seeded(99).generate_block(3, 1).unwrap();
    let b = StimulusGenerator::seeded(99).generate_block(3, 1).unwrap();
    let c = StimulusGenerator::seeded(100).generate_block(3, 1).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn generator_match_rate_converges_to_a_quarter() {
    let mut generator = StimulusGenerator::seeded(2024);
    for n in 1..=5u8 {
        let mut eligible = 0usize;
        let mut position_matches = 0usize;
        let mut audio_matches = 0usize;

        for block in 0..2_000u32 {
            let sequence = generator.generate_block(n, block).unwrap();
            for i in n as usize..sequence.len() {
                eligible += 1;
                position_matches += has_position_match(&sequence, i, level(n)) as usize;
                audio_matches += has_audio_match(&sequence, i, level(n)) as usize;
            }
        }

        let position_rate = position_matches as f64 / eligible as f64;
        let audio_rate = audio_matches as f64 / eligible as f64;
        assert!((position_rate - 0.25).abs() < 0.02, "n={n} position rate {position_rate}");
        assert!((audio_rate - 0.25).abs() < 0.02, "n={n} audio rate {audio_rate}");
    }
}

#[test]
fn generator_uses_whole_value_sets() {
    let mut generator = StimulusGenerator::seeded(5);
    let mut positions = std::collections::HashSet::new();
    let mut letters = std::collections::HashSet::new();
    for block in 0..200 {
        for s in generator.generate_block(2, block).unwrap() {
            positions.insert(s.position);
            letters.insert(s.letter);
        }
    }
    assert_eq!(positions.len(), 9);
    assert_eq!(letters.len(), 8);
}

// ===========================================================================
// MatchOracle
// ===========================================================================

#[test]
fn oracle_compares_against_lag_predecessor() {
    let sequence = vec![
        stim(0, Letter::C),
        stim(4, Letter::H),
        stim(0, Letter::K),
        stim(7, Letter::H),
    ];
    let two = level(2);
    assert!(has_position_match(&sequence, 2, two));
    assert!(!has_audio_match(&sequence, 2, two));
    assert!(!has_position_match(&sequence, 3, two));
    assert!(has_audio_match(&sequence, 3, two));
}

#[test]
fn oracle_false_without_history_or_past_end() {
    let sequence = vec![stim(1, Letter::S); 4];
    let three = level(3);
    for i in 0..3 {
        assert!(!has_position_match(&sequence, i, three));
        assert!(!has_audio_match(&sequence, i, three));
    }
    assert!(has_position_match(&sequence, 3, three));
    assert!(!has_position_match(&sequence, 4, three));
    assert!(!has_audio_match(&sequence, 10, three));
}

// ===========================================================================
// ResponseEvaluator
// ===========================================================================

#[test]
fn audio_only_match_answered_audio_is_fully_correct() {
    let result = evaluate(Response::Audio, false, true, 100, false);
    assert!(result.audio_correct);
    assert!(result.position_correct);
    assert!(result.trial_correct);
    assert_eq!(result.shards_earned, 1);
    assert_eq!(result.stability_delta, 0);
}

#[test]
fn position_press_without_any_match_is_false_alarm() {
    let result = evaluate(Response::Position, false, false, 100, false);
    assert!(result.position_false_alarm);
    assert!(!result.audio_false_alarm);
    assert!(!result.trial_correct);
    assert_eq!(result.stability_delta, FALSE_ALARM_PENALTY);
    assert_eq!(result.stability_delta, -15);
    assert_eq!(result.shards_earned, 0);
}

#[test]
fn miss_costs_ten() {
    let result = evaluate(Response::None, true, false, 100, false);
    assert!(result.position_miss);
    assert!(!result.audio_miss);
    assert_eq!(result.stability_delta, MISS_PENALTY);
    assert_eq!(result.stability_delta, -10);
}

#[test]
fn false_alarm_takes_priority_over_miss() {
    // Pressed position with no position match, missed the audio match.
    let result = evaluate(Response::Position, false, true, 100, false);
    assert!(result.position_false_alarm);
    assert!(result.audio_miss);
    assert_eq!(result.stability_delta, -15);

    // Two false alarms still cost only 15.
    let result = evaluate(Response::Both, false, false, 100, false);
    assert!(result.position_false_alarm && result.audio_false_alarm);
    assert_eq!(result.stability_delta, -15);

    // Two misses still cost only 10.
    let result = evaluate(Response::None, true, true, 100, false);
    assert_eq!(result.stability_delta, -10);
}

#[test]
fn trial_correct_iff_both_channels_correct() {
    let responses = [Response::Position, Response::Audio, Response::Both, Response::None];
    for response in responses {
        for pos_match in [false, true] {
            for audio_match in [false, true] {
                for safe in [false, true] {
                    let r = evaluate(response, pos_match, audio_match, 50, safe);
                    assert_eq!(r.trial_correct, r.position_correct && r.audio_correct);
                    assert!(r.shards_earned <= 1);
                    assert!(r.stability_delta <= 0);
                    assert_eq!(r.position_false_alarm, response.presses_position() && !pos_match);
                    assert_eq!(r.audio_miss, !response.presses_audio() && audio_match);
                    if safe {
                        assert_eq!(r.shards_earned, 0);
                    }
                }
            }
        }
    }
}

#[test]
fn no_reward_in_safe_mode_or_at_zero_stability() {
    assert_eq!(evaluate(Response::None, false, false, 40, true).shards_earned, 0);
    // A correct trial that leaves stability at 0 counts as entering safe mode.
    assert_eq!(evaluate(Response::None, false, false, 0, false).shards_earned, 0);
    assert_eq!(evaluate(Response::None, false, false, 1, false).shards_earned, 1);
}

// ===========================================================================
// DifficultyController
// ===========================================================================

#[test]
fn next_level_thresholds() {
    assert_eq!(next_level(80.0, level(3)), level(4));
    assert_eq!(next_level(60.0, level(3)), level(2));
    assert_eq!(next_level(70.0, level(3)), level(3));
    assert_eq!(next_level(79.9, level(3)), level(3));
    assert_eq!(next_level(60.1, level(3)), level(3));
}

#[test]
fn next_level_stays_in_range() {
    assert_eq!(next_level(100.0, level(5)), level(5));
    assert_eq!(next_level(0.0, level(1)), level(1));
    for n in 1..=5u8 {
        for accuracy in [-10.0, 0.0, 55.0, 65.0, 85.0, 100.0, 1_000.0] {
            let next = next_level(accuracy, level(n));
            assert!((1..=5).contains(&next.get()));
        }
    }
}

// ===========================================================================
// ActiveBlock
// ===========================================================================

fn two_back_sequence() -> Vec<Stimulus> {
    // Index 3 repeats index 1's letter but not its position.
    let mut sequence = vec![
        stim(0, Letter::C),
        stim(1, Letter::H),
        stim(2, Letter::K),
        stim(3, Letter::H),
    ];
    let fillers = [Letter::L, Letter::Q, Letter::R, Letter::S, Letter::T];
    for i in 4..TRIALS_PER_BLOCK {
        // Never matches: positions walk forward, letters cycle with period 5.
        sequence.push(stim((i % 9) as u8, fillers[i % fillers.len()]));
    }
    sequence
}

#[test]
fn letter_match_answered_with_audio_earns_a_shard() {
    let now = Utc::now();
    let mut block = ActiveBlock::new(1, level(2), two_back_sequence(), now);
    for _ in 0..3 {
        block.record(Response::None, None, now).unwrap();
    }

    let trial = block.record(Response::Audio, Some(420), now).unwrap();
    assert_eq!(trial.index, 3);
    assert!(trial.has_audio_match);
    assert!(!trial.has_position_match);
    assert!(trial.result.audio_correct);
    assert!(trial.result.position_correct);
    assert!(trial.result.trial_correct);
    assert_eq!(trial.result.shards_earned, 1);
    assert_eq!(trial.reaction_time_ms, Some(420));
    assert_eq!(block.shards(), 4);
}

#[test]
fn block_stops_recording_after_last_stimulus() {
    let now = Utc::now();
    let mut block = ActiveBlock::new(1, level(2), two_back_sequence(), now);
    for _ in 0..TRIALS_PER_BLOCK {
        assert!(block.record(Response::None, None, now).is_some());
    }
    assert!(block.is_exhausted());
    assert!(block.record(Response::Both, None, now).is_none());
    assert_eq!(block.trials().len(), TRIALS_PER_BLOCK);
}

#[test]
fn stability_never_rises_and_safe_mode_sticks() {
    let now = Utc::now();
    let mut block = ActiveBlock::new(1, level(2), two_back_sequence(), now);
    let mut previous = block.stability();
    let mut seen_safe_mode = false;

    for i in 0..TRIALS_PER_BLOCK {
        let response = if i % 3 == 0 { Response::None } else { Response::Both };
        let trial = block.record(response, None, now).unwrap();
        assert!(block.stability() <= previous);
        assert!(block.stability() <= MAX_STABILITY);
        previous = block.stability();

        if seen_safe_mode {
            assert!(block.in_safe_mode());
            assert_eq!(trial.result.shards_earned, 0);
        }
        seen_safe_mode |= block.in_safe_mode();
    }
    assert!(seen_safe_mode);
    assert_eq!(block.stability(), 0);
}

#[test]
fn snapshot_does_not_alias_block_in_progress() {
    let start = Utc::now();
    let mut block = ActiveBlock::new(1, level(2), two_back_sequence(), start);
    block.record(Response::None, None, start).unwrap();

    let snapshot = block.snapshot(start);
    block.record(Response::Both, None, start).unwrap();

    assert_eq!(snapshot.trials.len(), 1);
    assert_eq!(block.trials().len(), 2);
    assert_eq!(snapshot.final_stability, MAX_STABILITY);
}

#[test]
fn finished_block_accuracy_and_duration() {
    let start = Utc::now();
    let mut block = ActiveBlock::new(4, level(2), two_back_sequence(), start);
    // Index 3 is an audio match; answering None everywhere misses only that one.
    for _ in 0..TRIALS_PER_BLOCK {
        block.record(Response::None, None, start).unwrap();
    }
    let finished = block.finish(start + ChronoDuration::milliseconds(61_000));

    assert_eq!(finished.block_number, 4);
    assert_eq!(finished.correct_trials(), 19);
    assert!((finished.accuracy - 95.0).abs() < 1e-9);
    assert_eq!(finished.shards_earned, 19);
    assert_eq!(finished.final_stability, 90);
    assert!(!finished.hit_safe_mode);
    assert_eq!(finished.duration_ms, 61_000);
}

// ===========================================================================
// SessionAggregator
// ===========================================================================

fn finished_block(number: u32, n: u8, accuracy: f64, shards: u32) -> Block {
    Block {
        block_number: number,
        n_level: level(n),
        trials: Vec::new(),
        accuracy,
        shards_earned: shards,
        final_stability: 70,
        hit_safe_mode: false,
        duration_ms: 60_000,
    }
}

#[test]
fn fold_block_tracks_shards_and_peak_level() {
    let mut session = Session::new("u", level(2), Utc::now());

    let next = aggregator::fold_block(&mut session, finished_block(1, 2, 90.0, 17));
    assert_eq!(next, level(3));
    // Peak includes the level about to be played.
    assert_eq!(session.peak_n_level, level(3));

    let next = aggregator::fold_block(&mut session, finished_block(2, 3, 50.0, 8));
    assert_eq!(next, level(2));
    assert_eq!(session.peak_n_level, level(3));
    assert_eq!(session.total_shards, 25);
    assert_eq!(session.blocks.len(), 2);
}

#[test]
fn finalize_computes_mean_accuracy_and_duration() {
    let start = Utc::now();
    let mut session = Session::new("u", level(2), start);
    aggregator::fold_block(&mut session, finished_block(1, 2, 90.0, 17));
    aggregator::fold_block(&mut session, finished_block(2, 3, 60.0, 10));

    aggregator::finalize(&mut session, start + ChronoDuration::milliseconds(125_000));
    assert_eq!(session.average_accuracy, 75.0);
    assert_eq!(session.duration_ms, 125_000);
    assert!(session.is_finished());
}

#[test]
fn finalize_without_blocks_has_zero_accuracy() {
    let start = Utc::now();
    let mut session = Session::new("u", level(2), start);
    aggregator::finalize(&mut session, start);
    assert_eq!(session.average_accuracy, 0.0);
    assert_eq!(session.duration_ms, 0);
}

#[test]
fn accuracy_percent_bounds() {
    for total in 1..=20usize {
        for correct in 0..=total {
            let a = accuracy_percent(correct, total);
            assert!((0.0..=100.0).contains(&a));
        }
    }
}

// ===========================================================================
// EngineConfig
// ===========================================================================

#[test]
fn config_defaults_match_game_timing() {
    let config = EngineConfig::default();
    assert_eq!(config.timing.settle_ms, 1_000);
    assert_eq!(config.timing.response_window_ms, 2_500);
    assert_eq!(config.timing.feedback_ms, 500);
    assert_eq!(config.session.starting_level, 2);
    assert_eq!(config.audio.max_retries, 2);
    assert!(config.validate().is_ok());
}

#[test]
fn config_load_partial_file_keeps_other_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("neuralbreach.toml");
    let toml = "[timing]\nresponse_window_ms = 3000\n\n[session]\nstarting_level = 4\n";
    std::fs::write(&path, toml).unwrap();

    let config = EngineConfig::load(&path);
    assert_eq!(config.timing.response_window_ms, 3_000);
    assert_eq!(config.timing.feedback_ms, 500);
    assert_eq!(config.starting_level().unwrap(), level(4));
}

#[test]
fn config_load_falls_back_on_missing_or_broken_file() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(EngineConfig::load(&dir.path().join("absent.toml")), EngineConfig::default());

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "timing = [[[").unwrap();
    assert_eq!(EngineConfig::load(&broken), EngineConfig::default());
}

#[test]
fn config_toml_round_trips() {
    let config = EngineConfig::default();
    let parsed: EngineConfig = toml::from_str(&config.to_toml()).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn config_rejects_out_of_range_starting_level() {
    let mut config = EngineConfig::default();
    config.session.starting_level = 0;
    assert!(matches!(config.validate(), Err(Error::InvalidLevel { level: 0, .. })));
    config.session.starting_level = 6;
    assert!(matches!(config.validate(), Err(Error::InvalidLevel { level: 6, .. })));
}

#[test]
fn config_rejects_zero_response_window() {
    let mut config = EngineConfig::default();
    config.timing.response_window_ms = 0;
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
}

#[test]
fn config_try_load_reports_io_and_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = EngineConfig::try_load(&dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(Error::IoError(_))));

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "timing = [[[").unwrap();
    match EngineConfig::try_load(&broken) {
        Err(Error::ConfigError(message)) => assert!(message.contains("broken.toml")),
        other => panic!("expected ConfigError, got {:?}", other),
    }

    let good = dir.path().join("good.toml");
    std::fs::write(&good, "[audio]\nmax_retries = 5\n").unwrap();
    assert_eq!(EngineConfig::try_load(&good).unwrap().audio.max_retries, 5);
}

// ===========================================================================
// Audio collaborator
// ===========================================================================

struct FlakyAudio {
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyAudio {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl StimulusAudio for FlakyAudio {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn play(&self, letter: Letter) -> AudioResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(AudioError::playback(letter, "device busy"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn retrying_audio_recovers_within_budget() {
    let audio = RetryingAudio::new(FlakyAudio::failing(2), 2);
    assert!(audio.play(Letter::R).await.is_ok());
}

#[tokio::test]
async fn retrying_audio_gives_up_after_budget() {
    let audio = RetryingAudio::new(FlakyAudio::failing(10), 2);
    let err = audio.play(Letter::R).await.unwrap_err();
    assert!(matches!(err, AudioError::PlaybackFailed { letter: Letter::R, .. }));
}

#[tokio::test]
async fn present_swallows_audio_failure() {
    let flaky = FlakyAudio::failing(1);
    assert!(!audio::present(&flaky, Letter::T).await);
    assert!(audio::present(&flaky, Letter::T).await);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn silent_audio_always_succeeds() {
    assert!(audio::present(&SilentAudio, Letter::C).await);
}
