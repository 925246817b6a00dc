use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{AppError, AppResult};

/// Length of the face signatures produced by the dlib ResNet encoder.
pub const FACE_EMBEDDING_DIM: usize = facematch_config::DEFAULT_DIMENSION;

/// Disjoint subject universes. Matching never crosses pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolTag {
    Student,
    Staff,
}

impl PoolTag {
    pub const ALL: [PoolTag; 2] = [PoolTag::Student, PoolTag::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolTag::Student => "student",
            PoolTag::Staff => "staff",
        }
    }
}

impl fmt::Display for PoolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown pool '{0}' (expected 'student' or 'staff')")]
pub struct ParsePoolError(String);

impl FromStr for PoolTag {
    type Err = ParsePoolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" | "students" => Ok(PoolTag::Student),
            "staff" => Ok(PoolTag::Staff),
            _ => Err(ParsePoolError(value.to_string())),
        }
    }
}

/// Immutable face signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector(Vec<f64>);

impl Vector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A vector of the wrong length or with non-finite components can only come
    /// from a misconfigured encoder or a corrupted store, never from user input.
    pub fn validate(&self, dimension: usize, context: &str) -> AppResult<()> {
        if self.0.len() != dimension {
            return Err(AppError::Configuration(format!(
                "{context} has {} values, expected {dimension}",
                self.0.len()
            )));
        }
        if let Some(idx) = self.0.iter().position(|value| !value.is_finite()) {
            return Err(AppError::Configuration(format!(
                "{context} has a non-finite value at index {idx}"
            )));
        }
        Ok(())
    }
}

impl From<Vec<f64>> for Vector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Euclidean distance in double precision. Callers guarantee equal lengths.
pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(l, r)| {
            let delta = l - r;
            delta * delta
        })
        .sum::<f64>()
        .sqrt()
}

/// Face bounding box in image pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaceRegion {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl FaceRegion {
    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    pub id: String,
    pub pool: PoolTag,
    pub subject_id: String,
    pub vector: Vector,
    pub face_region: FaceRegion,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectRecord {
    pub pool: PoolTag,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub enrolled_at: String,
}

pub fn validate_subject_id(subject_id: &str) -> AppResult<()> {
    if subject_id.is_empty() {
        return Err(AppError::InvalidSubject {
            subject_id: subject_id.to_string(),
            message: "subject id cannot be empty".into(),
        });
    }

    if !subject_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(AppError::InvalidSubject {
            subject_id: subject_id.to_string(),
            message: "use ASCII letters, numbers, '-' or '_' only".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: f64) -> Vector {
        Vector::new(
            (0..FACE_EMBEDDING_DIM)
                .map(|idx| seed + idx as f64 * 0.01)
                .collect(),
        )
    }

    #[test]
    fn distance_to_self_is_zero() {
        for seed in [0.0, -0.37, 12.5] {
            let v = sample(seed);
            assert_eq!(euclidean_distance(v.as_slice(), v.as_slice()), 0.0);
        }
    }

    #[test]
    fn distance_matches_pythagoras() {
        let mut lhs = vec![0.0; FACE_EMBEDDING_DIM];
        let mut rhs = vec![0.0; FACE_EMBEDDING_DIM];
        lhs[0] = 3.0;
        rhs[1] = 4.0;
        assert!((euclidean_distance(&lhs, &rhs) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_wrong_length() {
        let err = Vector::new(vec![0.1; 64])
            .validate(FACE_EMBEDDING_DIM, "query")
            .unwrap_err();
        match err {
            AppError::Configuration(message) => {
                assert!(message.contains("64"));
                assert!(message.contains("128"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_non_finite_values() {
        let mut values = vec![0.0; FACE_EMBEDDING_DIM];
        values[7] = f64::NAN;
        let err = Vector::new(values)
            .validate(FACE_EMBEDDING_DIM, "query")
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(msg) if msg.contains("index 7")));
    }

    #[test]
    fn pool_tags_parse_case_insensitively() {
        assert_eq!("Student".parse::<PoolTag>().unwrap(), PoolTag::Student);
        assert_eq!(" staff ".parse::<PoolTag>().unwrap(), PoolTag::Staff);
        assert!("visitor".parse::<PoolTag>().is_err());
    }

    #[test]
    fn pool_tags_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&PoolTag::Staff).unwrap(),
            "\"staff\""
        );
    }

    #[test]
    fn subject_ids_are_restricted() {
        assert!(validate_subject_id("adm-2024_17").is_ok());
        assert!(matches!(
            validate_subject_id(""),
            Err(AppError::InvalidSubject { .. })
        ));
        assert!(matches!(
            validate_subject_id("../etc/passwd"),
            Err(AppError::InvalidSubject { .. })
        ));
    }
}
