use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, DefaultNumericTypes, HashMapContext,
};
use serde_json::Value;
use tracing::warn;

/// `visibility_condition` / `visibility_var_path` pair of a node.
///
/// `%s` in the condition stands for the current value at `var_path`, e.g.
/// `%s == "DFT"` or `%s == True`. A quoted `"%s"` is the value's text form,
/// so `"%s" == "DFT"` and `"%s" == "True"` work as well.
#[derive(Debug, Clone, PartialEq)]
pub struct Visibility {
    pub condition: String,
    pub var_path: String,
}

impl Visibility {
    const VALUE_VAR: &'static str = "value";

    pub fn evaluate(&self, value: &Value) -> bool {
        let expr = self
            .condition
            .split("\"%s\"")
            .map(|part| part.replace("%s", Self::VALUE_VAR))
            .collect::<Vec<_>>()
            .join(&quoted_text(value));

        let mut eval_ctx = HashMapContext::<DefaultNumericTypes>::new();
        let _ = eval_ctx.set_value("True".to_string(), evalexpr::Value::Boolean(true));
        let _ = eval_ctx.set_value("False".to_string(), evalexpr::Value::Boolean(false));
        if let Some(v) = to_eval_value(value) {
            let _ = eval_ctx.set_value(Self::VALUE_VAR.to_string(), v);
        }

        let result = build_operator_tree::<DefaultNumericTypes>(&expr)
            .and_then(|tree| tree.eval_boolean_with_context(&eval_ctx));
        match result {
            Ok(visible) => visible,
            Err(e) => {
                warn!(condition = %self.condition, error = %e, "visibility condition failed, showing node");
                true
            }
        }
    }
}

fn quoted_text(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn to_eval_value(value: &Value) -> Option<evalexpr::Value> {
    match value {
        Value::String(s) => Some(evalexpr::Value::String(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(evalexpr::Value::Int(i))
            } else {
                n.as_f64().map(evalexpr::Value::Float)
            }
        }
        Value::Bool(b) => Some(evalexpr::Value::Boolean(*b)),
        _ => None,
    }
}
