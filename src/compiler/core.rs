use crate::dsl::Element;
use crate::error::{Result, WanoError};
use crate::nodes::{
    Choice, DynamicSource, Leaf, MultipleOf, Node, NodeData, NodeId, Switch, Visibility,
};
use crate::runtime::tree::{child_path, WanoTree};
use indexmap::IndexMap;
use tracing::debug;

const DICT_TAGS: &[&str] = &[
    "WaNoRoot",
    "WaNoDictBox",
    "WaNoBox",
    "WaNoGroup",
    "WaNoInvisibleBox",
    "WaNoTabs",
    MultipleOf::INSTANCE_TAG,
];

/// Builds a [`WanoTree`] from a `WaNoRoot` element.
pub struct Compiler {
    tree: WanoTree,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            tree: WanoTree::default(),
        }
    }

    pub fn compile(mut self, root: &Element) -> Result<WanoTree> {
        let name = root.attr("name").unwrap_or("WaNoRoot").to_string();
        let root_id = build_node(&mut self.tree, root, None, name, String::new())?;
        self.tree.set_root(root_id);

        // Switches and dynamic dropdowns can only be evaluated once the
        // nodes they watch exist.
        self.tree.refresh(|_| true);
        debug!(nodes = self.tree.subtree(root_id).len(), "compiled WaNo tree");
        Ok(self.tree)
    }
}

/// Instantiates `element` and its subtree. The tag selects the node type;
/// an unknown tag aborts the whole build.
pub(crate) fn build_node(
    tree: &mut WanoTree,
    element: &Element,
    parent: Option<NodeId>,
    name: String,
    path: String,
) -> Result<NodeId> {
    let visibility = match (
        element.attr("visibility_condition"),
        element.attr("visibility_var_path"),
    ) {
        (Some(condition), Some(var_path)) => Some(Visibility {
            condition: condition.to_string(),
            var_path: var_path.to_string(),
        }),
        _ => None,
    };

    let shell = if element.tag == "WaNoNone" {
        element.clone()
    } else {
        Element {
            tag: element.tag.clone(),
            attributes: element.attributes.clone(),
            text: None,
            children: Vec::new(),
        }
    };

    let id = tree.alloc(Node {
        name,
        parent,
        full_path: path.clone(),
        element: shell,
        visibility,
        data: NodeData::None,
    });

    let tag = element.tag.as_str();
    let data = match tag {
        t if Leaf::is_leaf_tag(t) => NodeData::Leaf(Leaf::parse(element, &path)?),
        t if DICT_TAGS.contains(&t) => NodeData::Dict(build_dict_children(tree, element, id, &path)?),
        "WaNoList" => {
            let mut items = Vec::with_capacity(element.children.len());
            for (i, child) in element.children.iter().enumerate() {
                let index = i.to_string();
                let child_id = build_node(tree, child, Some(id), index.clone(), child_path(&path, &index))?;
                items.push(child_id);
            }
            NodeData::List(items)
        }
        "WaNoMultipleOf" => NodeData::MultipleOf(build_multiple_of(tree, element, id, &path)?),
        "WaNoDropDown" | "WaNoChoice" => NodeData::Choice(Choice::from_entries(element)),
        "WaNoDynamicDropDown" => {
            let source = DynamicSource {
                collection_path: element.required_attr("collection_path")?.to_string(),
                subpath: element.required_attr("subpath")?.to_string(),
            };
            tree.observers_mut().watch(&source.collection_path, id);
            let mut choice = Choice::from_entries(element);
            choice.dynamic = Some(source);
            NodeData::Choice(choice)
        }
        "WaNoSwitch" => NodeData::Switch(build_switch(tree, element, id, &path)?),
        "WaNoNone" => NodeData::None,
        other => {
            return Err(WanoError::NotImplemented {
                tag: other.to_string(),
            });
        }
    };

    tree.node_mut(id).data = data;
    Ok(id)
}

fn build_dict_children(
    tree: &mut WanoTree,
    element: &Element,
    id: NodeId,
    path: &str,
) -> Result<IndexMap<String, NodeId>> {
    let mut children = IndexMap::with_capacity(element.children.len());
    for child in &element.children {
        let name = child.required_attr("name")?.to_string();
        let path = child_path(path, &name);
        if children.contains_key(&name) {
            return Err(WanoError::DuplicateName(path));
        }
        let child_id = build_node(tree, child, Some(id), name.clone(), path)?;
        children.insert(name, child_id);
    }
    Ok(children)
}

fn build_multiple_of(
    tree: &mut WanoTree,
    element: &Element,
    id: NodeId,
    path: &str,
) -> Result<MultipleOf> {
    if let Some(other) = element
        .children
        .iter()
        .find(|c| c.tag != MultipleOf::INSTANCE_TAG)
    {
        return Err(WanoError::NotImplemented {
            tag: other.tag.clone(),
        });
    }

    if element.child(MultipleOf::INSTANCE_TAG).is_none() {
        return Err(WanoError::MissingElement(MultipleOf::INSTANCE_TAG.to_string()));
    }

    let mut instances = Vec::new();
    for (i, instance) in element.children.iter().enumerate() {
        let index = i.to_string();
        let instance_id = build_node(tree, instance, Some(id), index.clone(), child_path(path, &index))?;
        instances.push(instance_id);
    }
    Ok(MultipleOf { instances })
}

fn build_switch(tree: &mut WanoTree, element: &Element, id: NodeId, path: &str) -> Result<Switch> {
    let switch_path = element.required_attr("switch_path")?.to_string();
    if element.children.is_empty() {
        return Err(WanoError::MissingElement(format!(
            "alternative in WaNoSwitch '{path}'"
        )));
    }

    let mut names = Vec::with_capacity(element.children.len());
    let mut alternatives = Vec::with_capacity(element.children.len());
    for child in &element.children {
        let name = child
            .attr("switch_name")
            .or_else(|| child.attr("name"))
            .ok_or_else(|| WanoError::MissingAttribute {
                tag: child.tag.clone(),
                attribute: "switch_name".to_string(),
            })?
            .to_string();
        // Alternatives share the switch's path: only the active one is
        // reachable, so its leaves read as `<switch>.<leaf>`.
        let alt = build_node(tree, child, Some(id), name.clone(), path.to_string())?;
        names.push(name);
        alternatives.push(alt);
    }

    tree.observers_mut().watch(&switch_path, id);
    Ok(Switch {
        switch_path,
        names,
        alternatives,
        active: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::builder;

    #[test]
    fn test_unknown_tag_aborts_build() {
        let root = builder::dict(
            "root",
            vec![builder::float("a", 1.0), Element::new("WaNoHologram").with_attr("name", "h")],
        );
        match Compiler::new().compile(&root) {
            Err(WanoError::NotImplemented { tag }) => assert_eq!(tag, "WaNoHologram"),
            other => panic!("expected NotImplemented, got {other:?}"),
        }
    }

    #[test]
    fn test_paths_are_assigned_at_construction() {
        let root = builder::dict(
            "root",
            vec![builder::dict("Box", vec![builder::float("Lx", 25.0)])],
        );
        let tree = Compiler::new().compile(&root).unwrap();
        let id = tree.lookup("Box.Lx").unwrap();
        assert_eq!(tree.full_path(id), "Box.Lx");
        assert_eq!(tree.node(id).parent, tree.resolve("Box"));
    }

    #[test]
    fn test_duplicate_sibling_names_are_rejected() {
        let root = builder::dict(
            "root",
            vec![builder::float("a", 1.0), builder::float("a", 2.0)],
        );
        assert!(matches!(
            Compiler::new().compile(&root),
            Err(WanoError::DuplicateName(p)) if p == "a"
        ));
    }

    #[test]
    fn test_switch_requires_path() {
        let mut switch = builder::switch("S", "Method", vec![("A", vec![])]);
        switch.remove_attr("switch_path");
        let root = builder::dict("root", vec![switch]);
        assert!(matches!(
            Compiler::new().compile(&root),
            Err(WanoError::MissingAttribute { .. })
        ));
    }
}
