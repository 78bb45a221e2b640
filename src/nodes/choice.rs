use crate::dsl::Element;
use serde_json::Value;

/// Where a dynamic dropdown reads its alternatives from.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicSource {
    /// Path of the MultipleOf whose instances supply the entries.
    pub collection_path: String,
    /// Path of the value inside each instance.
    pub subpath: String,
}

/// Dropdown over literal string alternatives.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub choices: Vec<String>,
    pub chosen: usize,
    pub dynamic: Option<DynamicSource>,
}

impl Choice {
    pub fn from_entries(element: &Element) -> Self {
        let choices: Vec<String> = element
            .children_named("Entry")
            .map(|e| e.text_or_empty().trim().to_string())
            .collect();
        let chosen = element
            .children_named("Entry")
            .position(|e| matches!(e.attr("chosen"), Some("True" | "true")))
            .unwrap_or(0);
        Self {
            choices,
            chosen,
            dynamic: None,
        }
    }

    pub fn chosen_value(&self) -> Option<&str> {
        self.choices.get(self.chosen).map(String::as_str)
    }

    pub fn get_data(&self) -> Value {
        self.chosen_value()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null)
    }

    /// Returns false and keeps the selection when `index` is out of range.
    pub fn set_chosen(&mut self, index: usize) -> bool {
        if index >= self.choices.len() {
            return false;
        }
        self.chosen = index;
        true
    }

    pub fn set_chosen_value(&mut self, value: &str) -> bool {
        match self.choices.iter().position(|c| c == value) {
            Some(index) => self.set_chosen(index),
            None => false,
        }
    }

    /// Swaps in a new set of alternatives, keeping the chosen string when it
    /// survives. Returns whether the chosen value changed.
    pub fn replace_choices(&mut self, choices: Vec<String>) -> bool {
        let previous = self.chosen_value().map(str::to_string);
        self.chosen = previous
            .as_deref()
            .and_then(|p| choices.iter().position(|c| c == p))
            .unwrap_or(0);
        self.choices = choices;
        previous.as_deref() != self.chosen_value()
    }

    pub fn write_entries(&self, element: &mut Element) {
        element.children = self
            .choices
            .iter()
            .enumerate()
            .map(|(i, choice)| {
                let mut entry = Element::new("Entry")
                    .with_attr("id", i.to_string())
                    .with_text(choice.as_str());
                if i == self.chosen {
                    entry.set_attr("chosen", "True");
                }
                entry
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::builder;

    #[test]
    fn test_chosen_entry_is_read_from_attribute() {
        let choice = Choice::from_entries(&builder::dropdown("m", &["DFT", "MD"], 1));
        assert_eq!(choice.get_data(), Value::String("MD".to_string()));
    }

    #[test]
    fn test_out_of_range_selection_is_rejected() {
        let mut choice = Choice::from_entries(&builder::dropdown("m", &["DFT", "MD"], 0));
        assert!(!choice.set_chosen(5));
        assert!(!choice.set_chosen_value("QM"));
        assert_eq!(choice.chosen, 0);
    }

    #[test]
    fn test_replace_choices_keeps_surviving_selection() {
        let mut choice = Choice::from_entries(&builder::dropdown("m", &["a", "b", "c"], 2));
        assert!(!choice.replace_choices(vec!["c".into(), "d".into()]));
        assert_eq!(choice.chosen_value(), Some("c"));

        assert!(choice.replace_choices(vec!["x".into()]));
        assert_eq!(choice.chosen_value(), Some("x"));
    }
}
