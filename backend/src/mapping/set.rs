//! Mapping set manager: ordered CRUD and reordering over mapping rules.
//!
//! Pure bookkeeping. The set knows nothing about rows or coercion; order is
//! output-key insertion order.

use serde::Serialize;
use uuid::Uuid;

use super::rule::MappingRule;
use crate::error::MappingError;

/// Ordered collection of mapping rules with unique ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MappingSet {
    rules: Vec<MappingRule>,
}

impl MappingSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from rules that already carry ids.
    ///
    /// Entries without an id are dropped. Authoring errors and duplicate ids
    /// reject the whole list.
    pub fn from_rules(rules: Vec<MappingRule>) -> Result<Self, MappingError> {
        let mut set = Self::new();
        set.replace_all(rules)?;
        Ok(set)
    }

    /// Build a set from a JSON array of rule drafts.
    ///
    /// Every entry goes through [`MappingSet::add`], so ids in the input are
    /// ignored and fresh ones are assigned.
    pub fn import_json(json: &str) -> Result<Self, MappingError> {
        let drafts: Vec<MappingRule> = serde_json::from_str(json)?;
        let mut set = Self::new();
        for (index, draft) in drafts.into_iter().enumerate() {
            set.add(draft).map_err(|e| MappingError::Rejected {
                index,
                reason: e.to_string(),
            })?;
        }
        Ok(set)
    }

    /// Serialize to a JSON array (ids included)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Append a new rule and return its fresh id.
    ///
    /// Rejected without mutation when the target key is blank or a column
    /// rule has no source column.
    pub fn add(&mut self, draft: MappingRule) -> Result<String, MappingError> {
        let mut rule = draft.normalized();
        rule.validate()?;

        let id = self.generate_id();
        rule.set_id(id.clone());
        self.rules.push(rule);
        Ok(id)
    }

    /// Replace the rule with the patch's id, keeping its position.
    pub fn update(&mut self, patch: MappingRule) -> Result<(), MappingError> {
        if patch.id().is_empty() {
            return Err(MappingError::MissingId);
        }
        let rule = patch.normalized();
        rule.validate()?;

        let pos = self
            .position(rule.id())
            .ok_or_else(|| MappingError::UnknownId(rule.id().to_string()))?;
        self.rules[pos] = rule;
        Ok(())
    }

    /// Remove the rule with this id. Returns whether a rule was removed.
    pub fn delete(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.rules.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move `id` to the position currently held by `anchor_id`.
    ///
    /// Rules in between shift by one, as in a drag-and-drop list. No-op when
    /// either id is unknown or both are the same.
    pub fn reorder(&mut self, id: &str, anchor_id: &str) -> bool {
        if id == anchor_id {
            return false;
        }
        let (Some(from), Some(to)) = (self.position(id), self.position(anchor_id)) else {
            return false;
        };
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        true
    }

    /// Snapshot of the rules, skipping entries without an id.
    pub fn list(&self) -> Vec<MappingRule> {
        self.iter().cloned().collect()
    }

    /// Iterate over valid rules in order.
    pub fn iter(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter().filter(|r| !r.id().is_empty())
    }

    /// Replace every rule at once.
    pub fn replace_all(&mut self, rules: Vec<MappingRule>) -> Result<(), MappingError> {
        let mut kept: Vec<MappingRule> = Vec::with_capacity(rules.len());
        for rule in rules.into_iter().filter(|r| !r.id().is_empty()) {
            let rule = rule.normalized();
            rule.validate()?;
            if kept.iter().any(|k| k.id() == rule.id()) {
                return Err(MappingError::DuplicateId(rule.id().to_string()));
            }
            kept.push(rule);
        }
        self.rules = kept;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn get(&self, id: &str) -> Option<&MappingRule> {
        self.rules.iter().find(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Distinct source columns referenced by column rules, in rule order.
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for col in self.iter().filter_map(|r| r.source_column()) {
            if !columns.iter().any(|c| c == col) {
                columns.push(col.to_string());
            }
        }
        columns
    }

    /// Source columns that the given headers do not contain.
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        self.source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.id() == id)
    }

    fn generate_id(&self) -> String {
        loop {
            let random = Uuid::new_v4().simple().to_string();
            let id = format!(
                "mapping_{}_{}",
                chrono::Utc::now().timestamp_millis(),
                &random[..9]
            );
            if self.position(&id).is_none() {
                return id;
            }
        }
    }
}
