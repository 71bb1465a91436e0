// ============================================================
// Layer 3: Transform and Loss Kinds
// ============================================================
// Runs name their transform and loss by string in configs and
// on the command line ("rotation", "cos_sim", ...). These enums
// are the typed form of those strings. Parsing an unknown name
// is an error that lists every valid name.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

// ─── TransformKind ────────────────────────────────────────────────────────────
/// Every parametric family a run can fit or apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Identity,
    LinearMap,
    BiasedLinearMap,
    Translation,
    MeanTranslation,
    UncenteredLinearMap,
    BiasedUncenteredLinearMap,
    Rotation,
    BiasedRotation,
    UncenteredRotation,
    AnalyticalLinearMap,
    AnalyticalRotation,
    AnalyticalTranslation,
}

impl TransformKind {
    pub const ALL: [TransformKind; 13] = [
        TransformKind::Identity,
        TransformKind::LinearMap,
        TransformKind::BiasedLinearMap,
        TransformKind::Translation,
        TransformKind::MeanTranslation,
        TransformKind::UncenteredLinearMap,
        TransformKind::BiasedUncenteredLinearMap,
        TransformKind::Rotation,
        TransformKind::BiasedRotation,
        TransformKind::UncenteredRotation,
        TransformKind::AnalyticalLinearMap,
        TransformKind::AnalyticalRotation,
        TransformKind::AnalyticalTranslation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::Identity                  => "identity",
            TransformKind::LinearMap                 => "linear_map",
            TransformKind::BiasedLinearMap           => "biased_linear_map",
            TransformKind::Translation               => "translation",
            TransformKind::MeanTranslation           => "mean_translation",
            TransformKind::UncenteredLinearMap       => "uncentered_linear_map",
            TransformKind::BiasedUncenteredLinearMap => "biased_uncentered_linear_map",
            TransformKind::Rotation                  => "rotation",
            TransformKind::BiasedRotation            => "biased_rotation",
            TransformKind::UncenteredRotation        => "uncentered_rotation",
            TransformKind::AnalyticalLinearMap       => "analytical_linear_map",
            TransformKind::AnalyticalRotation        => "analytical_rotation",
            TransformKind::AnalyticalTranslation     => "analytical_translation",
        }
    }

    /// Whether the run needs an optimiser and a training loop.
    pub fn is_trainable(&self) -> bool {
        !matches!(
            self,
            TransformKind::Identity
                | TransformKind::MeanTranslation
                | TransformKind::AnalyticalLinearMap
                | TransformKind::AnalyticalRotation
                | TransformKind::AnalyticalTranslation
        )
    }

    /// Whether the transform is derived in closed form from the train split.
    pub fn is_analytical(&self) -> bool {
        matches!(
            self,
            TransformKind::AnalyticalLinearMap
                | TransformKind::AnalyticalRotation
                | TransformKind::AnalyticalTranslation
        )
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        TransformKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = TransformKind::ALL.iter().map(|k| k.name()).collect();
                anyhow!("unsupported transformation '{s}', expected one of: {}", valid.join(", "))
            })
    }
}

// ─── LossKind ─────────────────────────────────────────────────────────────────
/// The four interchangeable training objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossKind {
    #[serde(rename = "cos_sim")]
    CosSim,
    #[serde(rename = "l1_cos_sim")]
    L1CosSim,
    #[serde(rename = "l2_cos_sim")]
    L2CosSim,
    #[serde(rename = "mse_loss")]
    Mse,
}

impl LossKind {
    pub const ALL: [LossKind; 4] =
        [LossKind::CosSim, LossKind::L1CosSim, LossKind::L2CosSim, LossKind::Mse];

    pub fn name(&self) -> &'static str {
        match self {
            LossKind::CosSim   => "cos_sim",
            LossKind::L1CosSim => "l1_cos_sim",
            LossKind::L2CosSim => "l2_cos_sim",
            LossKind::Mse      => "mse_loss",
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        LossKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = LossKind::ALL.iter().map(|k| k.name()).collect();
                anyhow!("unsupported loss function '{s}', expected one of: {}", valid.join(", "))
            })
    }
}
