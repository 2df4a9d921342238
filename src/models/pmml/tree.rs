//! `TreeModel` evaluation

use super::document::{child_named, children_named, f64_attr, malformed, required_attr};
use super::{MiningFunction, Scored};
use crate::error::ModelLoadError;
use crate::types::{Record, Value};
use roxmltree::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    IsMissing,
    IsNotMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolOp {
    And,
    Or,
    Xor,
    Surrogate,
}

#[derive(Debug, Clone)]
enum Predicate {
    True,
    False,
    Simple {
        field: String,
        op: Operator,
        value: Option<String>,
    },
    Set {
        field: String,
        is_in: bool,
        values: Vec<String>,
    },
    Compound {
        op: BoolOp,
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    fn parse(node: Node<'_, '_>) -> Result<Self, ModelLoadError> {
        match node.tag_name().name() {
            "True" => Ok(Predicate::True),
            "False" => Ok(Predicate::False),
            "SimplePredicate" => {
                let op = match required_attr(node, "operator")? {
                    "equal" => Operator::Equal,
                    "notEqual" => Operator::NotEqual,
                    "lessThan" => Operator::LessThan,
                    "lessOrEqual" => Operator::LessOrEqual,
                    "greaterThan" => Operator::GreaterThan,
                    "greaterOrEqual" => Operator::GreaterOrEqual,
                    "isMissing" => Operator::IsMissing,
                    "isNotMissing" => Operator::IsNotMissing,
                    other => return Err(malformed(format!("unknown SimplePredicate operator '{other}'"))),
                };
                let value = node.attribute("value").map(str::to_string);
                if value.is_none() && !matches!(op, Operator::IsMissing | Operator::IsNotMissing) {
                    return Err(malformed("SimplePredicate is missing attribute 'value'"));
                }
                Ok(Predicate::Simple {
                    field: required_attr(node, "field")?.to_string(),
                    op,
                    value,
                })
            }
            "SimpleSetPredicate" => {
                let is_in = match required_attr(node, "booleanOperator")? {
                    "isIn" => true,
                    "isNotIn" => false,
                    other => return Err(malformed(format!("unknown SimpleSetPredicate operator '{other}'"))),
                };
                let array = child_named(node, "Array")
                    .ok_or_else(|| malformed("SimpleSetPredicate has no Array"))?;
                Ok(Predicate::Set {
                    field: required_attr(node, "field")?.to_string(),
                    is_in,
                    values: parse_array(array.text().unwrap_or_default()),
                })
            }
            "CompoundPredicate" => {
                let op = match required_attr(node, "booleanOperator")? {
                    "and" => BoolOp::And,
                    "or" => BoolOp::Or,
                    "xor" => BoolOp::Xor,
                    "surrogate" => BoolOp::Surrogate,
                    other => return Err(malformed(format!("unknown CompoundPredicate operator '{other}'"))),
                };
                let predicates = node
                    .children()
                    .filter(|c| c.is_element() && is_predicate(c.tag_name().name()))
                    .map(Predicate::parse)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Predicate::Compound { op, predicates })
            }
            other => Err(ModelLoadError::Unsupported(format!("tree predicate <{other}>"))),
        }
    }

    /// Three-valued evaluation; `None` means unknown (a referenced input is missing).
    fn evaluate(&self, record: &Record) -> Option<bool> {
        match self {
            Predicate::True => Some(true),
            Predicate::False => Some(false),
            Predicate::Simple { field, op, value } => {
                let actual = record.get(field).filter(|v| !v.is_missing());
                match op {
                    Operator::IsMissing => return Some(actual.is_none()),
                    Operator::IsNotMissing => return Some(actual.is_some()),
                    _ => {}
                }
                let actual = actual?;
                let expected = value.as_deref()?;
                compare(actual, expected, *op)
            }
            Predicate::Set {
                field,
                is_in,
                values,
            } => {
                let actual = record.get(field).filter(|v| !v.is_missing())?;
                let found = values
                    .iter()
                    .any(|v| compare(actual, v, Operator::Equal) == Some(true));
                Some(found == *is_in)
            }
            Predicate::Compound { op, predicates } => {
                let results = predicates.iter().map(|p| p.evaluate(record));
                match op {
                    BoolOp::And => {
                        let mut unknown = false;
                        for r in results {
                            match r {
                                Some(false) => return Some(false),
                                None => unknown = true,
                                Some(true) => {}
                            }
                        }
                        if unknown { None } else { Some(true) }
                    }
                    BoolOp::Or => {
                        let mut unknown = false;
                        for r in results {
                            match r {
                                Some(true) => return Some(true),
                                None => unknown = true,
                                Some(false) => {}
                            }
                        }
                        if unknown { None } else { Some(false) }
                    }
                    BoolOp::Xor => results
                        .collect::<Option<Vec<bool>>>()
                        .map(|all| all.into_iter().filter(|b| *b).count() % 2 == 1),
                    BoolOp::Surrogate => results.flatten().next(),
                }
            }
        }
    }
}

fn is_predicate(name: &str) -> bool {
    matches!(
        name,
        "True" | "False" | "SimplePredicate" | "SimpleSetPredicate" | "CompoundPredicate"
    )
}

fn compare(actual: &Value, expected: &str, op: Operator) -> Option<bool> {
    let numeric = actual
        .as_f64()
        .zip(expected.trim().parse::<f64>().ok());

    match (numeric, op) {
        (Some((a, b)), Operator::Equal) => Some(a == b),
        (Some((a, b)), Operator::NotEqual) => Some(a != b),
        (Some((a, b)), Operator::LessThan) => Some(a < b),
        (Some((a, b)), Operator::LessOrEqual) => Some(a <= b),
        (Some((a, b)), Operator::GreaterThan) => Some(a > b),
        (Some((a, b)), Operator::GreaterOrEqual) => Some(a >= b),
        (None, Operator::Equal) => Some(actual.to_string() == expected),
        (None, Operator::NotEqual) => Some(actual.to_string() != expected),
        _ => None,
    }
}

/// Split PMML `Array` content: whitespace separated, double quotes group.
fn parse_array(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut item = String::new();
        if c == '"' {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            item.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => item.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                item.push(c);
                chars.next();
            }
        }
        items.push(item);
    }

    items
}

#[derive(Debug, Clone)]
struct ScoreDistribution {
    value: String,
    record_count: f64,
    probability: Option<f64>,
}

#[derive(Debug, Clone)]
struct TreeNode {
    score: Option<String>,
    predicate: Predicate,
    distribution: Vec<ScoreDistribution>,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn parse(node: Node<'_, '_>) -> Result<Self, ModelLoadError> {
        let predicate = node
            .children()
            .find(|c| c.is_element() && is_predicate(c.tag_name().name()))
            .map(Predicate::parse)
            .transpose()?
            .ok_or_else(|| malformed("tree Node has no predicate"))?;

        let distribution = children_named(node, "ScoreDistribution")
            .map(|d| {
                Ok(ScoreDistribution {
                    value: required_attr(d, "value")?.to_string(),
                    record_count: f64_attr(d, "recordCount", Some(0.0))?,
                    probability: d
                        .attribute("probability")
                        .map(|_| f64_attr(d, "probability", None))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>, ModelLoadError>>()?;

        let children = children_named(node, "Node")
            .map(TreeNode::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            score: node.attribute("score").map(str::to_string),
            predicate,
            distribution,
            children,
        })
    }

    fn probabilities(&self) -> Vec<(String, f64)> {
        let total: f64 = self.distribution.iter().map(|d| d.record_count).sum();
        self.distribution
            .iter()
            .map(|d| {
                let p = d.probability.unwrap_or(if total > 0.0 {
                    d.record_count / total
                } else {
                    0.0
                });
                (d.value.clone(), p)
            })
            .collect()
    }

    fn collect_categories(&self, out: &mut Vec<String>) {
        for d in &self.distribution {
            if !out.contains(&d.value) {
                out.push(d.value.clone());
            }
        }
        for child in &self.children {
            child.collect_categories(out);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoTrueChild {
    ReturnNull,
    ReturnLast,
}

/// A parsed `TreeModel`
#[derive(Debug, Clone)]
pub(crate) struct TreeModel {
    function: MiningFunction,
    no_true_child: NoTrueChild,
    root: TreeNode,
}

impl TreeModel {
    pub fn parse(node: Node<'_, '_>, function: MiningFunction) -> Result<Self, ModelLoadError> {
        let no_true_child = match node.attribute("noTrueChildStrategy") {
            None | Some("returnNullPrediction") => NoTrueChild::ReturnNull,
            Some("returnLastPrediction") => NoTrueChild::ReturnLast,
            Some(other) => {
                return Err(ModelLoadError::Unsupported(format!(
                    "TreeModel noTrueChildStrategy '{other}'"
                )))
            }
        };
        let root = child_named(node, "Node")
            .ok_or_else(|| malformed("TreeModel has no root Node"))
            .and_then(TreeNode::parse)?;

        Ok(Self {
            function,
            no_true_child,
            root,
        })
    }

    /// Categories named by score distributions, in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.function == MiningFunction::Classification {
            self.root.collect_categories(&mut out);
        }
        out
    }

    fn select(&self, record: &Record) -> Option<&TreeNode> {
        if self.root.predicate.evaluate(record) != Some(true) {
            return None;
        }

        let mut node = &self.root;
        loop {
            let next = node
                .children
                .iter()
                .find(|c| c.predicate.evaluate(record) == Some(true));
            match next {
                Some(child) => node = child,
                None if node.children.is_empty() => return Some(node),
                None => {
                    return match self.no_true_child {
                        NoTrueChild::ReturnLast => Some(node),
                        NoTrueChild::ReturnNull => None,
                    }
                }
            }
        }
    }

    pub fn score(&self, record: &Record) -> Scored {
        let Some(node) = self.select(record) else {
            return Scored::missing();
        };

        match self.function {
            MiningFunction::Regression => match node.score.as_deref().map(str::trim) {
                Some(raw) => raw
                    .parse::<f64>()
                    .map(Scored::continuous)
                    .unwrap_or_else(|_| Scored::missing()),
                None => Scored::missing(),
            },
            MiningFunction::Classification => {
                let probabilities = node.probabilities();
                match &node.score {
                    Some(score) => Scored::with_winner(score.clone(), probabilities),
                    None if probabilities.is_empty() => Scored::missing(),
                    None => Scored::categorical(probabilities),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"<TreeModel functionName="classification">
  <Node score="low">
    <True/>
    <Node score="high">
      <CompoundPredicate booleanOperator="and">
        <SimplePredicate field="age" operator="greaterThan" value="30"/>
        <SimpleSetPredicate field="city" booleanOperator="isIn">
          <Array n="2" type="string">NY "San Francisco"</Array>
        </SimpleSetPredicate>
      </CompoundPredicate>
      <ScoreDistribution value="high" recordCount="8"/>
      <ScoreDistribution value="low" recordCount="2"/>
    </Node>
    <Node score="low">
      <True/>
      <ScoreDistribution value="high" recordCount="1"/>
      <ScoreDistribution value="low" recordCount="3"/>
    </Node>
  </Node>
</TreeModel>"#;

    fn tree() -> TreeModel {
        let doc = roxmltree::Document::parse(TREE).unwrap();
        TreeModel::parse(doc.root_element(), MiningFunction::Classification).unwrap()
    }

    fn record(age: f64, city: &str) -> Record {
        vec![("age", Value::Float(age)), ("city", Value::from(city))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_tree_follows_first_true_child() {
        let model = tree();

        let scored = model.score(&record(40.0, "San Francisco"));
        assert_eq!(scored.value, Value::String("high".to_string()));
        assert_eq!(scored.probabilities[0], ("high".to_string(), 0.8));

        let scored = model.score(&record(20.0, "NY"));
        assert_eq!(scored.value, Value::String("low".to_string()));
        assert_eq!(scored.probabilities[1], ("low".to_string(), 0.75));
    }

    #[test]
    fn test_unknown_predicate_counts_as_false() {
        let model = tree();
        let partial: Record = std::iter::once(("city", Value::from("NY"))).collect();

        let scored = model.score(&partial);
        assert_eq!(scored.value, Value::String("low".to_string()));
    }

    #[test]
    fn test_categories_in_first_seen_order() {
        assert_eq!(tree().categories(), vec!["high", "low"]);
    }

    #[test]
    fn test_null_prediction_when_no_child_matches() {
        let doc = roxmltree::Document::parse(
            r#"<TreeModel functionName="regression">
                 <Node score="1"><True/>
                   <Node score="2"><SimplePredicate field="x" operator="lessThan" value="0"/></Node>
                 </Node>
               </TreeModel>"#,
        )
        .unwrap();
        let model = TreeModel::parse(doc.root_element(), MiningFunction::Regression).unwrap();

        let x: Record = std::iter::once(("x", Value::Float(5.0))).collect();
        assert_eq!(model.score(&x).value, Value::Missing);

        let x: Record = std::iter::once(("x", Value::Float(-1.0))).collect();
        assert_eq!(model.score(&x).value, Value::Float(2.0));
    }

    #[test]
    fn test_parse_array_quotes() {
        assert_eq!(
            parse_array(r#"a "b c" "d\"e"  f"#),
            vec!["a", "b c", "d\"e", "f"]
        );
    }

    #[test]
    fn test_compound_three_valued_logic() {
        let empty = Record::new();
        let unknown = Predicate::Simple {
            field: "x".into(),
            op: Operator::Equal,
            value: Some("1".into()),
        };

        let and = Predicate::Compound {
            op: BoolOp::And,
            predicates: vec![unknown.clone(), Predicate::False],
        };
        assert_eq!(and.evaluate(&empty), Some(false));

        let or = Predicate::Compound {
            op: BoolOp::Or,
            predicates: vec![unknown.clone(), Predicate::False],
        };
        assert_eq!(or.evaluate(&empty), None);

        let surrogate = Predicate::Compound {
            op: BoolOp::Surrogate,
            predicates: vec![unknown, Predicate::True],
        };
        assert_eq!(surrogate.evaluate(&empty), Some(true));
    }
}
