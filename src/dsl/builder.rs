use crate::dsl::Element;

/// Fluent construction of `WaNoTemplate` documents.
pub struct TemplateBuilder {
    name: String,
    root: Element,
    exec_command: Option<String>,
    input_files: Vec<(String, String)>,
    output_files: Vec<String>,
}

impl TemplateBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: Element::new("WaNoRoot").with_attr("name", name),
            exec_command: None,
            input_files: Vec::new(),
            output_files: Vec::new(),
        }
    }

    pub fn node(mut self, element: Element) -> Self {
        self.root.children.push(element);
        self
    }

    pub fn float(self, name: &str, value: f64) -> Self {
        self.node(float(name, value))
    }

    pub fn string(self, name: &str, value: &str) -> Self {
        self.node(string(name, value))
    }

    pub fn boxed(self, name: &str) -> BoxBuilder {
        BoxBuilder {
            template_builder: self,
            element: Element::new("WaNoDictBox").with_attr("name", name),
        }
    }

    pub fn exec_command(mut self, command: &str) -> Self {
        self.exec_command = Some(command.to_string());
        self
    }

    pub fn input_file(mut self, logical: &str, local: &str) -> Self {
        self.input_files.push((logical.to_string(), local.to_string()));
        self
    }

    pub fn output_file(mut self, name: &str) -> Self {
        self.output_files.push(name.to_string());
        self
    }

    pub fn build(self) -> Element {
        let mut inputs = Element::new("WaNoInputFiles");
        for (logical, local) in self.input_files {
            inputs.children.push(
                Element::new("WaNoInputFile")
                    .with_attr("logical_filename", logical)
                    .with_text(local),
            );
        }
        let mut outputs = Element::new("WaNoOutputFiles");
        for name in self.output_files {
            outputs
                .children
                .push(Element::new("WaNoOutputFile").with_text(name));
        }

        Element::new("WaNoTemplate")
            .with_child(Element::new("WaNoMeta").with_attr("name", self.name))
            .with_child(self.root)
            .with_child(
                Element::new("WaNoExecCommand").with_text(self.exec_command.unwrap_or_default()),
            )
            .with_child(inputs)
            .with_child(outputs)
    }

    pub fn build_xml(self) -> String {
        // Writing into an in-memory buffer only fails on invalid UTF-8,
        // which `Element` cannot hold.
        self.build().to_xml_string().unwrap_or_default()
    }
}

pub struct BoxBuilder {
    template_builder: TemplateBuilder,
    element: Element,
}

impl BoxBuilder {
    pub fn child(mut self, element: Element) -> Self {
        self.element.children.push(element);
        self
    }

    pub fn float(self, name: &str, value: f64) -> Self {
        self.child(float(name, value))
    }

    pub fn build(mut self) -> TemplateBuilder {
        self.template_builder.root.children.push(self.element);
        self.template_builder
    }
}

pub fn float(name: &str, value: f64) -> Element {
    Element::new("WaNoFloat")
        .with_attr("name", name)
        .with_text(format!("{value:?}"))
}

pub fn int(name: &str, value: i64) -> Element {
    Element::new("WaNoInt")
        .with_attr("name", name)
        .with_text(value.to_string())
}

pub fn boolean(name: &str, value: bool) -> Element {
    Element::new("WaNoBool")
        .with_attr("name", name)
        .with_text(if value { "True" } else { "False" })
}

pub fn string(name: &str, value: &str) -> Element {
    Element::new("WaNoString")
        .with_attr("name", name)
        .with_text(value)
}

pub fn file(name: &str, logical_filename: &str, path: &str, local: bool) -> Element {
    Element::new("WaNoFile")
        .with_attr("name", name)
        .with_attr("logical_filename", logical_filename)
        .with_attr("local", if local { "True" } else { "False" })
        .with_text(path)
}

pub fn dict(name: &str, children: Vec<Element>) -> Element {
    let mut element = Element::new("WaNoDictBox").with_attr("name", name);
    element.children = children;
    element
}

pub fn multiple_of(name: &str, instance: Vec<Element>) -> Element {
    let mut first = Element::new("Element").with_attr("id", "0");
    first.children = instance;
    Element::new("WaNoMultipleOf")
        .with_attr("name", name)
        .with_child(first)
}

pub fn dropdown(name: &str, entries: &[&str], chosen: usize) -> Element {
    let mut element = Element::new("WaNoDropDown").with_attr("name", name);
    for (i, entry) in entries.iter().enumerate() {
        let mut e = Element::new("Entry")
            .with_attr("id", i.to_string())
            .with_text(*entry);
        if i == chosen {
            e.set_attr("chosen", "True");
        }
        element.children.push(e);
    }
    element
}

/// A switch over `alternatives`, each `(switch_name, children)`.
pub fn switch(name: &str, switch_path: &str, alternatives: Vec<(&str, Vec<Element>)>) -> Element {
    let mut element = Element::new("WaNoSwitch")
        .with_attr("name", name)
        .with_attr("switch_path", switch_path);
    for (switch_name, children) in alternatives {
        let mut alt = dict(switch_name, children);
        alt.set_attr("switch_name", switch_name);
        element.children.push(alt);
    }
    element
}
