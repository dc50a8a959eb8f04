use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub static READY: ConditionType = ConditionType("Ready");
pub static RECONCILING: ConditionType = ConditionType("Reconciling");
pub static STALLED: ConditionType = ConditionType("Stalled");

/// Rancher style generic condition.
///
/// Carries no timestamps: a status regenerated from the same inputs must
/// compare equal.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Objects carrying a list of conditions
pub trait Conditions {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConditionType(pub &'static str);

impl ConditionType {
    pub fn get<'a>(&self, obj: &'a impl Conditions) -> Option<&'a Condition> {
        obj.conditions().iter().find(|c| c.type_ == self.0)
    }

    pub fn is_true(&self, obj: &impl Conditions) -> bool {
        self.get(obj).is_some_and(|c| c.status == "True")
    }

    fn entry<'a>(&self, obj: &'a mut impl Conditions) -> &'a mut Condition {
        let conditions = obj.conditions_mut();
        let idx = match conditions.iter().position(|c| c.type_ == self.0) {
            Some(idx) => idx,
            None => {
                conditions.push(Condition {
                    type_: self.0.to_string(),
                    status: "Unknown".to_string(),
                    ..Default::default()
                });
                conditions.len() - 1
            }
        };
        &mut conditions[idx]
    }

    pub fn set(&self, obj: &mut impl Conditions, status: bool) {
        self.entry(obj).status = match status {
            true => "True",
            false => "False",
        }
        .to_string();
    }

    pub fn message(&self, obj: &mut impl Conditions, message: &str) {
        self.entry(obj).message = message.to_string();
    }
}

/// Summarize the object as fully reconciled
pub fn set_active(obj: &mut impl Conditions) {
    RECONCILING.set(obj, false);
    RECONCILING.message(obj, "");
    STALLED.set(obj, false);
    STALLED.message(obj, "");
    READY.set(obj, true);
    READY.message(obj, "");
}

/// Summarize the object as still converging, with an optional reason in `message`
pub fn set_transitioning(obj: &mut impl Conditions, message: &str) {
    RECONCILING.set(obj, true);
    RECONCILING.message(obj, message);
    STALLED.set(obj, false);
    STALLED.message(obj, "");
    READY.set(obj, false);
    READY.message(obj, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Status(Vec<Condition>);

    impl Conditions for Status {
        fn conditions(&self) -> &[Condition] {
            &self.0
        }

        fn conditions_mut(&mut self) -> &mut Vec<Condition> {
            &mut self.0
        }
    }

    #[test]
    fn set_appends_then_updates_in_place() {
        let mut status = Status::default();
        READY.set(&mut status, false);
        STALLED.set(&mut status, false);
        READY.set(&mut status, true);

        assert_eq!(status.0.len(), 2);
        assert_eq!(status.0[0].type_, "Ready");
        assert!(READY.is_true(&status));
        assert!(!STALLED.is_true(&status));
    }

    #[test]
    fn missing_condition_is_not_true() {
        assert!(!READY.is_true(&Status::default()));
        assert!(READY.get(&Status::default()).is_none());
    }

    #[test]
    fn active_and_transitioning_summaries() {
        let mut status = Status::default();
        set_transitioning(&mut status, "waiting");
        assert!(RECONCILING.is_true(&status));
        assert!(!READY.is_true(&status));
        assert_eq!(READY.get(&status).map(|c| c.message.as_str()), Some("waiting"));

        set_active(&mut status);
        assert!(READY.is_true(&status));
        assert!(!RECONCILING.is_true(&status));
        assert_eq!(READY.get(&status).map(|c| c.message.as_str()), Some(""));
        assert_eq!(status.0.len(), 3);
    }
}
