use crate::dsl::Element;
use crate::error::{Result, WanoError};
use serde_json::{json, Value};

/// Scalar payload of a leaf node.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
    File(FileRef),
    Matrix(Matrix),
}

/// A file input. `script` files are always staged from the local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRef {
    pub path: String,
    pub logical_filename: String,
    pub local: bool,
    pub script: bool,
}

/// Rectangular table of floats or strings, written as a JSON array literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub numeric: bool,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub value: LeafValue,
}

impl Leaf {
    pub fn is_leaf_tag(tag: &str) -> bool {
        matches!(
            tag,
            "WaNoFloat"
                | "WaNoInt"
                | "WaNoBool"
                | "WaNoString"
                | "WaNoFile"
                | "WaNoScript"
                | "WaNoMatrixFloat"
                | "WaNoMatrixString"
        )
    }

    /// String values keep their whitespace; every other kind is trimmed.
    pub fn parse(element: &Element, path: &str) -> Result<Self> {
        let raw = element.text_or_empty();
        let text = raw.trim();
        let value = match element.tag.as_str() {
            "WaNoFloat" => LeafValue::Float(parse_float(text, path)?),
            "WaNoInt" => LeafValue::Int(parse_int(text, path)?),
            "WaNoBool" => LeafValue::Bool(parse_bool(text, path)?),
            "WaNoString" => LeafValue::String(raw.to_string()),
            "WaNoFile" => LeafValue::File(FileRef {
                path: text.to_string(),
                logical_filename: element.required_attr("logical_filename")?.to_string(),
                local: element.attr("local").map(is_true).unwrap_or(false),
                script: false,
            }),
            "WaNoScript" => LeafValue::File(FileRef {
                path: text.to_string(),
                logical_filename: element
                    .attr("logical_filename")
                    .map(str::to_string)
                    .unwrap_or_else(|| basename(text)),
                local: true,
                script: true,
            }),
            "WaNoMatrixFloat" => LeafValue::Matrix(parse_matrix(text, true, path)?),
            "WaNoMatrixString" => LeafValue::Matrix(parse_matrix(text, false, path)?),
            other => {
                return Err(WanoError::NotImplemented {
                    tag: other.to_string(),
                })
            }
        };
        Ok(Self { value })
    }

    /// Primitive kind as reported to the renderer.
    pub fn type_str(&self) -> &'static str {
        match &self.value {
            LeafValue::Float(_) => "Float",
            LeafValue::Int(_) => "Int",
            LeafValue::Bool(_) => "Boolean",
            LeafValue::String(_) => "String",
            LeafValue::File(_) => "File",
            LeafValue::Matrix(_) => "Matrix",
        }
    }

    pub fn get_data(&self) -> Value {
        match &self.value {
            LeafValue::Float(f) => json!(f),
            LeafValue::Int(i) => json!(i),
            LeafValue::Bool(b) => json!(b),
            LeafValue::String(s) => json!(s),
            LeafValue::File(f) => json!(f.path),
            LeafValue::Matrix(m) => json!(m.rows),
        }
    }

    pub fn file(&self) -> Option<&FileRef> {
        match &self.value {
            LeafValue::File(f) => Some(f),
            _ => None,
        }
    }

    /// Converts `text` to this leaf's kind. On failure the old value stays.
    pub fn set_text(&mut self, text: &str, path: &str) -> Result<()> {
        match &mut self.value {
            LeafValue::Float(f) => *f = parse_float(text, path)?,
            LeafValue::Int(i) => *i = parse_int(text, path)?,
            LeafValue::Bool(b) => *b = parse_bool(text, path)?,
            LeafValue::String(s) => *s = text.to_string(),
            LeafValue::File(f) => f.path = text.trim().to_string(),
            LeafValue::Matrix(m) => *m = parse_matrix(text, m.numeric, path)?,
        }
        Ok(())
    }

    /// Text form written back into the XML element.
    pub fn to_text(&self) -> String {
        match &self.value {
            LeafValue::Float(f) => format!("{f:?}"),
            LeafValue::Int(i) => i.to_string(),
            LeafValue::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
            LeafValue::String(s) => s.clone(),
            LeafValue::File(f) => f.path.clone(),
            LeafValue::Matrix(m) => Value::from(m.rows.clone()).to_string(),
        }
    }

    pub fn write_attributes(&self, element: &mut Element) {
        if let LeafValue::File(f) = &self.value {
            element.set_attr("logical_filename", f.logical_filename.as_str());
            if !f.script {
                element.set_attr("local", if f.local { "True" } else { "False" });
            }
        }
    }
}

fn is_true(text: &str) -> bool {
    matches!(text.trim(), "True" | "true" | "1")
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// `inf` and `NaN` have no plain-data form, so only finite values pass.
fn parse_float(text: &str, path: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| invalid(text, path, "a finite float"))
}

fn parse_int(text: &str, path: &str) -> Result<i64> {
    text.trim().parse().map_err(|_| invalid(text, path, "an integer"))
}

fn parse_bool(text: &str, path: &str) -> Result<bool> {
    match text.trim() {
        "True" | "true" | "1" => Ok(true),
        "False" | "false" | "0" => Ok(false),
        _ => Err(invalid(text, path, "True or False")),
    }
}

fn parse_matrix(text: &str, numeric: bool, path: &str) -> Result<Matrix> {
    let expected = if numeric {
        "a rectangular matrix of floats"
    } else {
        "a rectangular matrix of strings"
    };
    if text.trim().is_empty() {
        return Ok(Matrix {
            numeric,
            rows: Vec::new(),
        });
    }

    let rows: Vec<Vec<Value>> =
        serde_json::from_str(text).map_err(|_| invalid(text, path, expected))?;
    let width = rows.first().map(Vec::len).unwrap_or(0);
    let well_formed = rows.iter().all(|row| {
        row.len() == width
            && row
                .iter()
                .all(|cell| if numeric { cell.is_number() } else { cell.is_string() })
    });
    if !well_formed {
        return Err(invalid(text, path, expected));
    }
    Ok(Matrix { numeric, rows })
}

fn invalid(text: &str, path: &str, expected: &'static str) -> WanoError {
    WanoError::InvalidValue {
        path: path.to_string(),
        value: text.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::builder;

    #[test]
    fn test_float_leaf() {
        let mut leaf = Leaf::parse(&builder::float("Lx", 25.0), "Box.Lx").unwrap();
        assert_eq!(leaf.type_str(), "Float");
        assert_eq!(leaf.get_data(), json!(25.0));

        leaf.set_text("40", "Box.Lx").unwrap();
        assert_eq!(leaf.to_text(), "40.0");

        let err = leaf.set_text("forty", "Box.Lx").unwrap_err();
        assert!(matches!(err, WanoError::InvalidValue { .. }));
        assert_eq!(leaf.get_data(), json!(40.0));
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let mut leaf = Leaf::parse(&builder::float("x", 1.5), "x").unwrap();
        for text in ["inf", "-inf", "NaN", "infinity"] {
            assert!(matches!(
                leaf.set_text(text, "x"),
                Err(WanoError::InvalidValue { .. })
            ));
        }
        assert_eq!(leaf.get_data(), json!(1.5));

        let element = Element::new("WaNoFloat").with_attr("name", "x").with_text("NaN");
        assert!(Leaf::parse(&element, "x").is_err());
    }

    #[test]
    fn test_string_keeps_surrounding_whitespace() {
        let mut leaf = Leaf::parse(&builder::string("s", "  padded "), "s").unwrap();
        assert_eq!(leaf.get_data(), json!("  padded "));

        leaf.set_text(" a b ", "s").unwrap();
        assert_eq!(leaf.to_text(), " a b ");

        let mut number = Leaf::parse(&builder::int("n", 1), "n").unwrap();
        number.set_text(" 7 ", "n").unwrap();
        assert_eq!(number.get_data(), json!(7));
    }

    #[test]
    fn test_bool_accepts_python_spelling() {
        let leaf = Leaf::parse(&builder::boolean("flag", true), "flag").unwrap();
        assert_eq!(leaf.to_text(), "True");
        assert_eq!(leaf.get_data(), json!(true));
    }

    #[test]
    fn test_file_requires_logical_filename() {
        let element = Element::new("WaNoFile")
            .with_attr("name", "f")
            .with_text("a.txt");
        assert!(matches!(
            Leaf::parse(&element, "f"),
            Err(WanoError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_script_defaults_logical_name_to_basename() {
        let element = Element::new("WaNoScript")
            .with_attr("name", "s")
            .with_text("scripts/run.sh");
        let leaf = Leaf::parse(&element, "s").unwrap();
        let file = leaf.file().unwrap();
        assert_eq!(file.logical_filename, "run.sh");
        assert!(file.local);
        assert_eq!(leaf.type_str(), "File");
    }

    #[test]
    fn test_matrix_must_be_rectangular() {
        let ok = Element::new("WaNoMatrixFloat")
            .with_attr("name", "m")
            .with_text("[[1.0, 2.0], [3.0, 4.0]]");
        let leaf = Leaf::parse(&ok, "m").unwrap();
        assert_eq!(leaf.get_data(), json!([[1.0, 2.0], [3.0, 4.0]]));

        let ragged = ok.clone().with_text("[[1.0, 2.0], [3.0]]");
        assert!(Leaf::parse(&ragged, "m").is_err());
    }
}
