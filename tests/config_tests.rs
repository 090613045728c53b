// tests/config_tests.rs
//
// Environment overrides and system resolution.
//
// Environment variables are process-wide, so every test that touches
// CALF_* serializes on ENV_MUTEX and clears what it set.

use std::sync::Mutex;

use calf::{
    build_controller, resolve_effective_system, CalfVariant, ControllerConfig, SystemKind,
    SystemSource,
};

static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "CALF_SYSTEM",
    "CALF_SAMPLING_TIME",
    "CALF_CRITIC_PERIOD",
    "CALF_CONTROLLER_GAIN",
    "CALF_SAFE_DECAY",
    "CALF_BUFFER_SIZE",
    "CALF_OPT_ITERS_PER_DIM",
    "CALF_OPT_TOL",
    "CALF_VARIANT",
    "CALF_SAFE_ONLY",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
fn cli_system_wins_over_env() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    std::env::set_var("CALF_SYSTEM", "ni");

    let eff = resolve_effective_system(Some(SystemKind::KinPoint));
    assert_eq!(eff.system, SystemKind::KinPoint);
    assert_eq!(eff.source, SystemSource::Cli);

    let eff = resolve_effective_system(None);
    assert_eq!(eff.system, SystemKind::Ni);
    assert_eq!(eff.source, SystemSource::Env);

    clear_env();
}

#[test]
fn invalid_env_system_falls_back_to_default() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    std::env::set_var("CALF_SYSTEM", "hovercraft");

    let eff = resolve_effective_system(None);
    assert_eq!(eff.system, SystemKind::Endi);
    assert_eq!(eff.source, SystemSource::Default);

    clear_env();
}

#[test]
fn env_overrides_apply_on_top_of_preset() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    std::env::set_var("CALF_SAMPLING_TIME", "0.05");
    std::env::set_var("CALF_CONTROLLER_GAIN", "3.5");
    std::env::set_var("CALF_BUFFER_SIZE", "7");
    std::env::set_var("CALF_OPT_TOL", "1e-5");
    std::env::set_var("CALF_VARIANT", "predictive");
    std::env::set_var("CALF_SAFE_ONLY", "yes");

    let cfg = ControllerConfig::from_env_or_system(SystemKind::Ni);
    assert_eq!(cfg.sampling_time, 0.05);
    assert_eq!(cfg.safe.gain, 3.5);
    assert_eq!(cfg.critic.buffer_size, 7);
    assert_eq!(cfg.actor.buffer_size, 7);
    assert_eq!(cfg.optimizer.xtol, 1e-5);
    assert_eq!(cfg.optimizer.ftol, 1e-5);
    assert_eq!(cfg.variant, CalfVariant::Predictive);
    assert!(cfg.safe_only);

    let ctrl = build_controller(&cfg).unwrap();
    assert_eq!(ctrl.name(), "safe-only");

    clear_env();
}

#[test]
fn unparsable_env_values_are_ignored() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    std::env::set_var("CALF_SAMPLING_TIME", "fast");
    std::env::set_var("CALF_BUFFER_SIZE", "-3");
    std::env::set_var("CALF_VARIANT", "greedy");
    std::env::set_var("CALF_SAFE_ONLY", "maybe");

    let preset = ControllerConfig::for_system(SystemKind::Endi);
    let cfg = ControllerConfig::from_env_or_system(SystemKind::Endi);
    assert_eq!(cfg.sampling_time, preset.sampling_time);
    assert_eq!(cfg.critic.buffer_size, preset.critic.buffer_size);
    assert_eq!(cfg.variant, CalfVariant::ExPost);
    assert!(!cfg.safe_only);

    clear_env();
}

#[test]
fn invalid_override_is_caught_at_construction() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    std::env::set_var("CALF_BUFFER_SIZE", "0");

    let cfg = ControllerConfig::from_env_or_system(SystemKind::KinPoint);
    assert!(build_controller(&cfg).is_err());

    clear_env();
}

#[test]
fn kin_point_preset_matches_proportional_actor() {
    let cfg = ControllerConfig::for_system(SystemKind::KinPoint);
    assert_eq!(cfg.observation_dim(), 2);
    assert_eq!(cfg.actor_initial_weights(), vec![-1.0, 0.0, 0.0, -1.0]);
    assert_eq!(cfg.critic_initial_weights(), vec![1.0, 0.0, 1.0]);
}
