use crate::error::{LayoutError, Result};
use crate::utils::leading_whitespace;
use crate::vocabulary::Vocabulary;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One line item with its resolved place in the sheet's tree. Links are
/// indices into the slice returned by [`HierarchyBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyNode {
    pub row: usize,
    pub original_text: String,
    pub name: String,
    pub display_index: Option<String>,
    /// Leading whitespace count.
    pub raw_level: usize,
    /// Level from the rules, before nesting under a parent.
    pub resolved_level: usize,
    pub level: usize,
    pub level_adjusted: bool,
    pub hierarchical_number: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HierarchyReport {
    pub items: usize,
    pub roots: usize,
    pub max_depth: usize,
    #[schemars(description = "Items whose final level differs from the level the text rules gave")]
    pub adjusted: usize,
}

pub struct HierarchyBuilder<'a> {
    vocabulary: &'a Vocabulary,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(vocabulary: &'a Vocabulary) -> Self {
        Self { vocabulary }
    }

    /// Builds the tree for one sheet's line items, given in row order.
    pub fn build<S: AsRef<str>>(&self, records: &[(usize, S)]) -> Vec<HierarchyNode> {
        let mut nodes: Vec<HierarchyNode> = Vec::with_capacity(records.len());
        let mut anchor_level = 0;

        for (row, text) in records {
            let original_text = text.as_ref().to_string();
            let (name, display_index) = self.split_numbering(&original_text);
            let raw_level = leading_whitespace(&original_text);
            let trimmed = original_text.trim();

            let top_level = self.vocabulary.top_level.is_match(trimmed);
            let subordinate = !top_level && self.vocabulary.subordinate.is_match(trimmed);
            let resolved_level = if top_level {
                0
            } else if subordinate && raw_level == 0 {
                anchor_level + 2
            } else {
                raw_level
            };
            if !subordinate {
                anchor_level = resolved_level;
            }

            nodes.push(HierarchyNode {
                row: *row,
                original_text,
                name,
                display_index,
                raw_level,
                resolved_level,
                level: 0,
                level_adjusted: false,
                hierarchical_number: String::new(),
                parent: None,
                children: Vec::new(),
            });
        }

        nest(&mut nodes);
        assign_numbers(&mut nodes);
        nodes
    }

    /// Strips a leading numbering token (`1.`, `1 `, `1、`, `(1)`) that sits
    /// after any indentation. Returns the remaining text, right-trimmed with
    /// its indentation, and the token's digits.
    pub fn split_numbering(&self, text: &str) -> (String, Option<String>) {
        let trimmed_end = text.trim_end();
        let body = trimmed_end.trim_start();
        let indent = &trimmed_end[..trimmed_end.len() - body.len()];

        if let Some((whole, digits)) = self.vocabulary.numbering_tokens.first_capture(body) {
            let rest = body[whole.len()..].trim_end();
            if !rest.trim().is_empty() {
                return (format!("{}{}", indent, rest), Some(digits.to_string()));
            }
        }

        (trimmed_end.to_string(), None)
    }

    /// Checks the tree invariants: levels grow by at most one per item and
    /// every parent sits earlier with a strictly smaller level.
    pub fn verify(&self, sheet: &str, nodes: &[HierarchyNode]) -> Result<()> {
        let violation = |node: &HierarchyNode, details: String| LayoutError::HierarchyInvariant {
            sheet: sheet.to_string(),
            row: node.row,
            details,
        };

        for (index, node) in nodes.iter().enumerate() {
            let ceiling = index
                .checked_sub(1)
                .map_or(0, |previous| nodes[previous].level + 1);
            if node.level > ceiling {
                return Err(violation(
                    node,
                    format!("level {} exceeds the allowed {}", node.level, ceiling),
                ));
            }

            if let Some(parent) = node.parent {
                if parent >= index {
                    return Err(violation(node, format!("parent index {} is not earlier", parent)));
                }
                if nodes[parent].level >= node.level {
                    return Err(violation(
                        node,
                        format!(
                            "parent level {} is not above level {}",
                            nodes[parent].level, node.level
                        ),
                    ));
                }
                if !nodes[parent].children.contains(&index) {
                    return Err(violation(node, "parent does not list this item as a child".to_string()));
                }
            } else if node.level != 0 {
                return Err(violation(node, format!("level {} item has no parent", node.level)));
            }
        }

        Ok(())
    }

    pub fn report(&self, nodes: &[HierarchyNode]) -> HierarchyReport {
        HierarchyReport {
            items: nodes.len(),
            roots: nodes.iter().filter(|node| node.parent.is_none()).count(),
            max_depth: nodes.iter().map(|node| node.level).max().unwrap_or(0),
            adjusted: nodes.iter().filter(|node| node.level_adjusted).count(),
        }
    }
}

/// One counter per level; deeper counters reset when a shallower item
/// appears. Integer numbering written by the author replaces the counter.
fn assign_numbers(nodes: &mut [HierarchyNode]) {
    let mut counters: Vec<usize> = Vec::new();

    for node in nodes.iter_mut() {
        counters.truncate(node.level + 1);
        while counters.len() < node.level + 1 {
            counters.push(0);
        }

        let authored = node
            .display_index
            .as_deref()
            .and_then(|index| index.parse::<usize>().ok());
        counters[node.level] = match authored {
            Some(value) => value,
            None => counters[node.level] + 1,
        };

        node.hierarchical_number = counters
            .iter()
            .map(|counter| counter.to_string())
            .collect::<Vec<_>>()
            .join(".");
    }
}

/// Parent = nearest earlier item with a strictly smaller resolved level;
/// the final level is one below the parent's, or 0 for a root. Items at the
/// same resolved level therefore stay siblings, and a jump of more than one
/// step collapses to one.
fn nest(nodes: &mut [HierarchyNode]) {
    let mut stack: Vec<usize> = Vec::new();

    for index in 0..nodes.len() {
        let resolved = nodes[index].resolved_level;
        while let Some(&top) = stack.last() {
            if nodes[top].resolved_level >= resolved {
                stack.pop();
            } else {
                break;
            }
        }

        let level = match stack.last() {
            Some(&parent) => {
                nodes[index].parent = Some(parent);
                nodes[parent].children.push(index);
                nodes[parent].level + 1
            }
            None => 0,
        };

        let node = &mut nodes[index];
        node.level = level;
        node.level_adjusted = level != resolved;
        if node.level_adjusted {
            debug!(
                "Row {}: level {} adjusted to {} ('{}')",
                node.row,
                resolved,
                level,
                node.original_text.trim()
            );
        }
        stack.push(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(texts: &[&str]) -> Vec<HierarchyNode> {
        let vocabulary = Vocabulary::standard().unwrap();
        let builder = HierarchyBuilder::new(&vocabulary);
        let records: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .map(|(offset, text)| (offset + 5, *text))
            .collect();
        let nodes = builder.build(&records);
        builder.verify("Sheet", &nodes).unwrap();
        nodes
    }

    fn numbers(nodes: &[HierarchyNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.hierarchical_number.as_str()).collect()
    }

    #[test]
    fn test_numbered_items_with_indented_child() {
        let nodes = build(&["1.Revenue", "  Cost of sales", "2.Tax"]);

        assert_eq!(numbers(&nodes), vec!["1", "1.1", "2"]);
        assert_eq!(nodes[0].name, "Revenue");
        assert_eq!(nodes[0].display_index.as_deref(), Some("1"));
        assert_eq!(nodes[1].name, "  Cost of sales");
        assert_eq!(nodes[1].raw_level, 2);
        assert_eq!(nodes[1].parent, Some(0));
        assert_eq!(nodes[0].children, vec![1]);
        assert_eq!(nodes[2].parent, None);
    }

    #[test]
    fn test_level_jump_is_clamped() {
        let nodes = build(&["Assets", " Current assets", "    Cash"]);

        let levels: Vec<usize> = nodes.iter().map(|node| node.level).collect();
        assert_eq!(levels, vec![0, 1, 2]);
        assert_eq!(nodes[2].resolved_level, 4);
        assert!(nodes[2].level_adjusted);
        assert!(!nodes[1].level_adjusted);
        assert_eq!(nodes[2].parent, Some(1));
    }

    #[test]
    fn test_subordinate_keywords_nest_under_root() {
        let nodes = build(&["一、营业收入", "减：营业成本", "加：其他收益", "二、营业利润"]);

        let levels: Vec<usize> = nodes.iter().map(|node| node.level).collect();
        assert_eq!(levels, vec![0, 1, 1, 0]);
        assert_eq!(nodes[1].resolved_level, 2);
        assert!(nodes[1].level_adjusted);
        assert_eq!(nodes[1].parent, Some(0));
        assert_eq!(nodes[2].parent, Some(0));
        assert_eq!(nodes[0].children, vec![1, 2]);
        assert_eq!(numbers(&nodes), vec!["1", "1.1", "1.2", "2"]);
    }

    #[test]
    fn test_equal_indentation_gives_siblings() {
        let nodes = build(&["Assets", "  Cash", "  Receivables", "  Inventory", "Liabilities"]);

        let levels: Vec<usize> = nodes.iter().map(|node| node.level).collect();
        assert_eq!(levels, vec![0, 1, 1, 1, 0]);
        let parents: Vec<Option<usize>> = nodes.iter().map(|node| node.parent).collect();
        assert_eq!(parents, vec![None, Some(0), Some(0), Some(0), None]);
        assert_eq!(numbers(&nodes), vec!["1", "1.1", "1.2", "1.3", "2"]);
    }

    #[test]
    fn test_deeper_indentation_nests_under_sibling_group() {
        let nodes = build(&["Assets", "  Current", "      Cash", "      Bank", "  Fixed"]);

        let levels: Vec<usize> = nodes.iter().map(|node| node.level).collect();
        assert_eq!(levels, vec![0, 1, 2, 2, 1]);
        assert_eq!(nodes[3].parent, Some(1));
        assert_eq!(nodes[4].parent, Some(0));
        assert_eq!(numbers(&nodes), vec!["1", "1.1", "1.1.1", "1.1.2", "1.2"]);
    }

    #[test]
    fn test_authored_numbers_are_adopted() {
        let nodes = build(&["3.Other income", "  (1) Grants", "  Interest", "4 Finance costs"]);

        assert_eq!(numbers(&nodes), vec!["3", "3.1", "3.2", "4"]);
        assert_eq!(nodes[1].name, "  Grants");
        assert_eq!(nodes[1].display_index.as_deref(), Some("1"));
        assert_eq!(nodes[3].name, "Finance costs");
    }

    #[test]
    fn test_first_item_is_clamped_to_root() {
        let nodes = build(&["   Opening note", "Revenue"]);
        assert_eq!(nodes[0].level, 0);
        assert!(nodes[0].level_adjusted);
    }

    #[test]
    fn test_bare_number_is_not_stripped() {
        let vocabulary = Vocabulary::standard().unwrap();
        let builder = HierarchyBuilder::new(&vocabulary);
        assert_eq!(builder.split_numbering("12."), ("12.".to_string(), None));
        assert_eq!(builder.split_numbering("Revenue  "), ("Revenue".to_string(), None));
    }

    #[test]
    fn test_verify_rejects_forward_parent() {
        let vocabulary = Vocabulary::standard().unwrap();
        let builder = HierarchyBuilder::new(&vocabulary);
        let mut nodes = builder.build(&[(1, "A"), (2, " B")]);
        nodes[1].parent = Some(1);
        assert!(matches!(
            builder.verify("Sheet", &nodes),
            Err(LayoutError::HierarchyInvariant { row: 2, .. })
        ));
    }

    #[test]
    fn test_report_counts() {
        let vocabulary = Vocabulary::standard().unwrap();
        let builder = HierarchyBuilder::new(&vocabulary);
        let nodes = builder.build(&[(1, "A"), (2, "    B"), (3, "C")]);
        let report = builder.report(&nodes);
        assert_eq!(
            report,
            HierarchyReport {
                items: 3,
                roots: 2,
                max_depth: 1,
                adjusted: 1
            }
        );
    }
}
