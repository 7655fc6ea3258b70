//! Selectors: students choosing projects in a project class.

use serde::{Deserialize, Serialize};

/// Convenor-supplied override on a (selector, project) pairing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hint {
    #[default]
    Neutral,
    /// The pairing must be chosen.
    Require,
    /// The pairing must not be chosen.
    Forbid,
    Encourage,
    Discourage,
    StronglyEncourage,
    StronglyDiscourage,
}

impl Hint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hint::Neutral => "neutral",
            Hint::Require => "require",
            Hint::Forbid => "forbid",
            Hint::Encourage => "encourage",
            Hint::Discourage => "discourage",
            Hint::StronglyEncourage => "strongly-encourage",
            Hint::StronglyDiscourage => "strongly-discourage",
        }
    }
}

/// One ranked entry of a selector's submitted list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionChoice {
    pub project_id: String,
    /// 1 = first choice.
    pub rank: u32,
    /// The entry was converted automatically from a bookmark.
    pub converted_from_bookmark: bool,
    pub hint: Hint,
}

/// A student selecting projects within one project class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selector {
    pub id: String,
    pub student_name: String,
    /// Degree programme, matched against project programme preferences.
    pub programme: Option<String>,
    pub pclass_id: String,
    /// Ranked choices in rank order. Empty if no list was submitted.
    pub choices: Vec<SelectionChoice>,
}

impl Selector {
    pub fn new(id: impl Into<String>, pclass_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            student_name: String::new(),
            programme: None,
            pclass_id: pclass_id.into(),
            choices: Vec::new(),
        }
    }

    pub fn with_student_name(mut self, name: impl Into<String>) -> Self {
        self.student_name = name.into();
        self
    }

    pub fn with_programme(mut self, programme: impl Into<String>) -> Self {
        self.programme = Some(programme.into());
        self
    }

    /// Appends an explicit choice with the given rank.
    pub fn with_choice(mut self, project_id: impl Into<String>, rank: u32) -> Self {
        self.choices.push(SelectionChoice {
            project_id: project_id.into(),
            rank,
            converted_from_bookmark: false,
            hint: Hint::Neutral,
        });
        self
    }

    /// Appends a choice converted from a bookmark.
    pub fn with_bookmark_choice(mut self, project_id: impl Into<String>, rank: u32) -> Self {
        self.choices.push(SelectionChoice {
            project_id: project_id.into(),
            rank,
            converted_from_bookmark: true,
            hint: Hint::Neutral,
        });
        self
    }

    /// Sets the hint on an existing choice. Unknown projects are ignored.
    pub fn with_hint(mut self, project_id: &str, hint: Hint) -> Self {
        if let Some(choice) = self.choices.iter_mut().find(|c| c.project_id == project_id) {
            choice.hint = hint;
        }
        self
    }

    /// Whether the selector submitted a ranked list.
    pub fn has_submitted(&self) -> bool {
        !self.choices.is_empty()
    }

    pub fn choice_for(&self, project_id: &str) -> Option<&SelectionChoice> {
        self.choices.iter().find(|c| c.project_id == project_id)
    }

    pub fn rank_of(&self, project_id: &str) -> Option<u32> {
        self.choice_for(project_id).map(|c| c.rank)
    }

    pub fn hint_for(&self, project_id: &str) -> Hint {
        self.choice_for(project_id)
            .map(|c| c.hint)
            .unwrap_or_default()
    }
}
