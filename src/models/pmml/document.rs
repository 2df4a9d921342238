//! Shared PMML document pieces: data dictionary, mining schema, outputs

use crate::error::ModelLoadError;
use crate::types::{DataType, Value};
use roxmltree::Node;

pub(crate) fn malformed(msg: impl Into<String>) -> ModelLoadError {
    ModelLoadError::Malformed(msg.into())
}

/// Element children with the given local name.
pub(crate) fn children_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

pub(crate) fn child_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> Option<Node<'a, 'input>> {
    children_named(node, name).next()
}

pub(crate) fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, ModelLoadError> {
    node.attribute(name).ok_or_else(|| {
        malformed(format!(
            "<{}> is missing attribute '{}'",
            node.tag_name().name(),
            name
        ))
    })
}

/// Parse a numeric attribute, falling back to `default` when absent.
pub(crate) fn f64_attr(
    node: Node<'_, '_>,
    name: &str,
    default: Option<f64>,
) -> Result<f64, ModelLoadError> {
    match node.attribute(name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            malformed(format!(
                "<{}> attribute '{}' is not a number: {:?}",
                node.tag_name().name(),
                name,
                raw
            ))
        }),
        None => default.ok_or_else(|| {
            malformed(format!(
                "<{}> is missing attribute '{}'",
                node.tag_name().name(),
                name
            ))
        }),
    }
}

/// One `DataField` of the data dictionary
#[derive(Debug, Clone)]
pub(crate) struct DataField {
    pub name: String,
    pub data_type: Option<String>,
    /// Declared categories (`Value` children), in document order
    pub values: Vec<String>,
}

impl DataField {
    fn parse(node: Node<'_, '_>) -> Result<Self, ModelLoadError> {
        let values = children_named(node, "Value")
            .filter(|v| v.attribute("property").map_or(true, |p| p == "valid"))
            .filter_map(|v| v.attribute("value").map(str::to_string))
            .collect();

        Ok(Self {
            name: required_attr(node, "name")?.to_string(),
            data_type: node.attribute("dataType").map(str::to_string),
            values,
        })
    }
}

/// Interpret raw text according to a PMML data type name.
pub(crate) fn typed_value(data_type: Option<&str>, raw: &str) -> Value {
    match data_type.map(DataType::from_engine_name) {
        Some(DataType::Integer) => raw
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(DataType::Float) => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

pub(crate) fn parse_data_dictionary(root: Node<'_, '_>) -> Result<Vec<DataField>, ModelLoadError> {
    match child_named(root, "DataDictionary") {
        Some(dict) => children_named(dict, "DataField").map(DataField::parse).collect(),
        None => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Usage {
    Active,
    Target,
    Supplementary,
    Other,
}

/// One `MiningField` of the model's mining schema
#[derive(Debug, Clone)]
pub(crate) struct MiningField {
    pub name: String,
    pub usage: Usage,
}

/// Parse `MiningSchema`; `None` when the model does not carry one.
pub(crate) fn parse_mining_schema(
    model: Node<'_, '_>,
) -> Result<Option<Vec<MiningField>>, ModelLoadError> {
    let Some(schema) = child_named(model, "MiningSchema") else {
        return Ok(None);
    };

    children_named(schema, "MiningField")
        .map(|f| {
            let usage = match f.attribute("usageType").unwrap_or("active") {
                "active" => Usage::Active,
                "target" | "predicted" => Usage::Target,
                "supplementary" => Usage::Supplementary,
                _ => Usage::Other,
            };
            Ok(MiningField {
                name: required_attr(f, "name")?.to_string(),
                usage,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputFeature {
    PredictedValue,
    Probability,
    Other(String),
}

/// One `OutputField` of the model's `Output` element
#[derive(Debug, Clone)]
pub(crate) struct OutputField {
    pub name: String,
    pub data_type: Option<String>,
    pub feature: OutputFeature,
    /// Category selected by `probability` outputs
    pub value: Option<String>,
}

/// Parse `Output`; `None` when the model does not carry one.
pub(crate) fn parse_output(model: Node<'_, '_>) -> Result<Option<Vec<OutputField>>, ModelLoadError> {
    let Some(output) = child_named(model, "Output") else {
        return Ok(None);
    };

    children_named(output, "OutputField")
        .map(|f| {
            let feature = match f.attribute("feature").unwrap_or("predictedValue") {
                "predictedValue" => OutputFeature::PredictedValue,
                "probability" => OutputFeature::Probability,
                other => OutputFeature::Other(other.to_string()),
            };
            Ok(OutputField {
                name: required_attr(f, "name")?.to_string(),
                data_type: f.attribute("dataType").map(str::to_string),
                feature,
                value: f.attribute("value").map(str::to_string),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Application name and version from the `Header`, if present.
pub(crate) fn parse_header(root: Node<'_, '_>) -> Option<String> {
    let header = child_named(root, "Header")?;
    if let Some(desc) = header.attribute("description") {
        return Some(desc.to_string());
    }
    let app = child_named(header, "Application")?;
    let name = app.attribute("name")?;
    Some(match app.attribute("version") {
        Some(version) => format!("{name} {version}"),
        None => name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<PMML xmlns="http://www.dmg.org/PMML-4_4" version="4.4">
  <Header><Application name="exporter" version="1.2"/></Header>
  <DataDictionary>
    <DataField name="x" optype="continuous" dataType="double"/>
    <DataField name="y" optype="categorical" dataType="string">
      <Value value="a"/><Value value="b"/><Value value="?" property="missing"/>
    </DataField>
  </DataDictionary>
  <RegressionModel functionName="regression">
    <MiningSchema>
      <MiningField name="x"/>
      <MiningField name="y" usageType="target"/>
    </MiningSchema>
  </RegressionModel>
</PMML>"#;

    #[test]
    fn test_parse_dictionary_and_schema() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let root = doc.root_element();

        let dict = parse_data_dictionary(root).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict[0].data_type.as_deref(), Some("double"));
        assert_eq!(dict[1].values, vec!["a", "b"]);

        let model = child_named(root, "RegressionModel").unwrap();
        let mining = parse_mining_schema(model).unwrap().unwrap();
        assert_eq!(mining[0].usage, Usage::Active);
        assert_eq!(mining[1].usage, Usage::Target);
        assert!(parse_output(model).unwrap().is_none());

        assert_eq!(parse_header(root).as_deref(), Some("exporter 1.2"));
    }

    #[test]
    fn test_typed_value() {
        assert_eq!(typed_value(Some("integer"), "2"), Value::Integer(2));
        assert_eq!(typed_value(Some("double"), "2.5"), Value::Float(2.5));
        assert_eq!(typed_value(Some("string"), "2"), Value::String("2".into()));
        assert_eq!(typed_value(None, "yes"), Value::String("yes".into()));
    }

    #[test]
    fn test_bad_numeric_attribute() {
        let doc = roxmltree::Document::parse(r#"<T intercept="abc"/>"#).unwrap();
        let err = f64_attr(doc.root_element(), "intercept", Some(0.0)).unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }
}
