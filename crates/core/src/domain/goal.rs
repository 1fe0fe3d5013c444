use crate::domain::validation::{is_positive_amount, ValidationError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub name: String,
    pub target_amount: f64,
    pub current_amount: f64,
    pub deadline: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGoal {
    pub name: String,
    pub target_amount: f64,
    pub deadline: NaiveDate,
}

impl NewGoal {
    /// Goals start with nothing saved.
    pub fn validate(self) -> Result<Goal, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyGoalName);
        }
        if !is_positive_amount(self.target_amount) {
            return Err(ValidationError::InvalidTargetAmount(self.target_amount));
        }
        Ok(Goal {
            id: Uuid::new_v4(),
            name,
            target_amount: self.target_amount,
            current_amount: 0.0,
            deadline: self.deadline,
            created_at: Utc::now(),
        })
    }
}

pub fn validate_contribution(amount: f64) -> Result<f64, ValidationError> {
    if is_positive_amount(amount) {
        Ok(amount)
    } else {
        Err(ValidationError::InvalidContribution(amount))
    }
}

impl Goal {
    /// Percent of target saved. Not capped: overshooting the target reports
    /// more than 100.
    pub fn progress_percent(&self) -> f64 {
        self.current_amount / self.target_amount * 100.0
    }

    pub fn progress_display(&self) -> i64 {
        self.progress_percent().round() as i64
    }

    pub fn remaining(&self) -> f64 {
        (self.target_amount - self.current_amount).max(0.0)
    }

    pub fn is_reached(&self) -> bool {
        self.current_amount >= self.target_amount
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalProgress {
    #[serde(flatten)]
    pub goal: Goal,
    pub progress_percent: i64,
    pub remaining: f64,
    pub reached: bool,
}

impl From<Goal> for GoalProgress {
    fn from(goal: Goal) -> Self {
        Self {
            progress_percent: goal.progress_display(),
            remaining: goal.remaining(),
            reached: goal.is_reached(),
            goal,
        }
    }
}
