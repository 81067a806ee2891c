//! Immutable transition table for the question-answering graph.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::{Error, Result};

/// States of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Route,
    Retrieve,
    GradeDocuments,
    WebSearch,
    Generate,
    RetryGenerate,
}

impl Node {
    pub const ALL: [Node; 6] = [
        Node::Route,
        Node::Retrieve,
        Node::GradeDocuments,
        Node::WebSearch,
        Node::Generate,
        Node::RetryGenerate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Node::Route => "route",
            Node::Retrieve => "retrieve",
            Node::GradeDocuments => "grade_documents",
            Node::WebSearch => "websearch",
            Node::Generate => "generate",
            Node::RetryGenerate => "retry_generate",
        }
    }

    /// Branches this node's handler can emit.
    pub fn branches(&self) -> &'static [Branch] {
        match self {
            Node::Route => &[Branch::Vectorstore, Branch::Websearch],
            Node::Retrieve | Node::WebSearch | Node::RetryGenerate => &[Branch::Continue],
            Node::GradeDocuments => &[Branch::WebSearchNeeded, Branch::DocumentsRelevant],
            Node::Generate => &[Branch::Useful, Branch::NotUseful, Branch::NotSupported],
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome label a node hands to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Continue,
    Vectorstore,
    Websearch,
    WebSearchNeeded,
    DocumentsRelevant,
    Useful,
    NotUseful,
    NotSupported,
}

impl Branch {
    pub fn name(&self) -> &'static str {
        match self {
            Branch::Continue => "continue",
            Branch::Vectorstore => "vectorstore",
            Branch::Websearch => "websearch",
            Branch::WebSearchNeeded => "web_search_needed",
            Branch::DocumentsRelevant => "documents_relevant",
            Branch::Useful => "useful",
            Branch::NotUseful => "not_useful",
            Branch::NotSupported => "not_supported",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Node(Node),
    End,
}

/// Validated `(node, branch) -> target` table.
#[derive(Debug, Clone)]
pub struct Workflow {
    entry: Node,
    edges: HashMap<(Node, Branch), Target>,
}

impl Workflow {
    /// The standard graph:
    /// route -> retrieve | websearch, retrieve -> grade_documents,
    /// grade_documents -> websearch | generate, websearch -> generate,
    /// generate -> end | websearch | retry_generate, retry_generate -> generate.
    pub fn standard() -> Self {
        Self::builder(Node::Route)
            .edge(Node::Route, Branch::Vectorstore, Target::Node(Node::Retrieve))
            .edge(Node::Route, Branch::Websearch, Target::Node(Node::WebSearch))
            .edge(Node::Retrieve, Branch::Continue, Target::Node(Node::GradeDocuments))
            .edge(
                Node::GradeDocuments,
                Branch::WebSearchNeeded,
                Target::Node(Node::WebSearch),
            )
            .edge(
                Node::GradeDocuments,
                Branch::DocumentsRelevant,
                Target::Node(Node::Generate),
            )
            .edge(Node::WebSearch, Branch::Continue, Target::Node(Node::Generate))
            .edge(Node::Generate, Branch::Useful, Target::End)
            .edge(Node::Generate, Branch::NotUseful, Target::Node(Node::WebSearch))
            .edge(
                Node::Generate,
                Branch::NotSupported,
                Target::Node(Node::RetryGenerate),
            )
            .edge(Node::RetryGenerate, Branch::Continue, Target::Node(Node::Generate))
            .build()
            .expect("standard workflow is complete")
    }

    pub fn builder(entry: Node) -> WorkflowBuilder {
        WorkflowBuilder {
            entry,
            edges: HashMap::new(),
        }
    }

    pub fn entry(&self) -> Node {
        self.entry
    }

    pub fn next(&self, node: Node, branch: Branch) -> Result<Target> {
        self.edges.get(&(node, branch)).copied().ok_or_else(|| {
            Error::InvalidArgument(format!("no transition from {} on {}", node, branch))
        })
    }

    /// Render as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["graph LR;".to_string(), format!("    __start__ --> {};", self.entry)];
        for node in Node::ALL {
            for branch in node.branches() {
                let Some(target) = self.edges.get(&(node, *branch)) else {
                    continue;
                };
                let target = match target {
                    Target::Node(next) => next.name(),
                    Target::End => "__end__",
                };
                let arrow = if node.branches().len() > 1 {
                    format!("-.->|{}|", branch)
                } else {
                    "-->".to_string()
                };
                lines.push(format!("    {} {} {};", node, arrow, target));
            }
        }
        lines.join("\n")
    }
}

pub struct WorkflowBuilder {
    entry: Node,
    edges: HashMap<(Node, Branch), Target>,
}

impl WorkflowBuilder {
    pub fn edge(mut self, from: Node, branch: Branch, to: Target) -> Self {
        self.edges.insert((from, branch), to);
        self
    }

    /// Every branch a reachable node can emit must have an edge, and the end
    /// must be reachable.
    pub fn build(self) -> Result<Workflow> {
        let mut reachable = vec![self.entry];
        let mut cursor = 0;
        let mut ends = false;

        while cursor < reachable.len() {
            let node = reachable[cursor];
            cursor += 1;
            for branch in node.branches() {
                match self.edges.get(&(node, *branch)) {
                    None => {
                        return Err(Error::InvalidArgument(format!(
                            "node {} has no edge for branch {}",
                            node, branch
                        )))
                    }
                    Some(Target::End) => ends = true,
                    Some(Target::Node(next)) => {
                        if !reachable.contains(next) {
                            reachable.push(*next);
                        }
                    }
                }
            }
        }

        if !ends {
            return Err(Error::InvalidArgument("workflow never reaches the end".into()));
        }

        Ok(Workflow {
            entry: self.entry,
            edges: self.edges,
        })
    }
}
