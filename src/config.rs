use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ImdpError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IterationMethod {
    Jacobi,
    GaussSeidel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopCriterion {
    Absolute,
    Relative,
}

/// How the probability inside the intervals is resolved relative to the
/// action choice. `Cooperative` resolves in the same direction as the
/// nondeterminism, `Antagonistic` in the opposite one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalPlayer {
    Cooperative,
    Antagonistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LumpMethod {
    PerState,
    PerBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitBlockMethod {
    Simple,
    Signature,
    PseudoSignature,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LumpOptions {
    pub method: LumpMethod,
    pub split_block: SplitBlockMethod,
    pub shortcut_zero_actions: bool,
    pub shortcut_action_exact_before: bool,
    pub shortcut_unsimulable_class: bool,
    pub shortcut_action_exact_after: bool,
    pub cache_before_normalisation: bool,
    pub cache_after_normalisation: bool,
    pub no_self_compare: bool,
    pub signature_normalise: bool,
}

impl Default for LumpOptions {
    fn default() -> Self {
        LumpOptions {
            method: LumpMethod::PerBlock,
            split_block: SplitBlockMethod::Signature,
            shortcut_zero_actions: true,
            shortcut_action_exact_before: true,
            shortcut_unsimulable_class: true,
            shortcut_action_exact_after: true,
            cache_before_normalisation: false,
            cache_after_normalisation: true,
            no_self_compare: true,
            signature_normalise: false,
        }
    }
}

/// Every tunable of the solver and the lumper. Components take a reference
/// to this at construction time, there is no process wide option store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub iteration_method: IterationMethod,
    pub stop_criterion: StopCriterion,
    pub tolerance: f64,
    pub interval_player: IntervalPlayer,
    pub lump: LumpOptions,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            iteration_method: IterationMethod::GaussSeidel,
            stop_criterion: StopCriterion::Absolute,
            tolerance: 1e-10,
            interval_player: IntervalPlayer::Cooperative,
            lump: LumpOptions::default(),
        }
    }
}

impl Options {
    /// Checks the values serde and the command line cannot rule out.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ImdpError::invalid_model(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

pub fn read_options_json<P: AsRef<Path>>(path: P) -> Result<Options> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let options: Options = serde_json::from_reader(reader)?;
    options.validate()?;
    Ok(options)
}

fn unknown(kind: &str, value: &str) -> ImdpError {
    ImdpError::unsupported(format!("unknown {} '{}'", kind, value))
}

impl FromStr for IterationMethod {
    type Err = ImdpError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jacobi" => Ok(IterationMethod::Jacobi),
            "gauss-seidel" | "gs" => Ok(IterationMethod::GaussSeidel),
            _ => Err(unknown("iteration method", s)),
        }
    }
}

impl FromStr for StopCriterion {
    type Err = ImdpError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "absolute" => Ok(StopCriterion::Absolute),
            "relative" => Ok(StopCriterion::Relative),
            _ => Err(unknown("stop criterion", s)),
        }
    }
}

impl FromStr for IntervalPlayer {
    type Err = ImdpError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cooperative" => Ok(IntervalPlayer::Cooperative),
            "antagonistic" => Ok(IntervalPlayer::Antagonistic),
            _ => Err(unknown("interval player", s)),
        }
    }
}

impl FromStr for LumpMethod {
    type Err = ImdpError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "statewise" | "per-state" => Ok(LumpMethod::PerState),
            "blockwise" | "per-block" => Ok(LumpMethod::PerBlock),
            _ => Err(unknown("lump method", s)),
        }
    }
}

impl FromStr for SplitBlockMethod {
    type Err = ImdpError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(SplitBlockMethod::Simple),
            "signature" => Ok(SplitBlockMethod::Signature),
            "pseudo-signature" => Ok(SplitBlockMethod::PseudoSignature),
            _ => Err(unknown("split block method", s)),
        }
    }
}
