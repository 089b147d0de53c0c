//! Parameter layout of a Burn record
//!
//! A record serializes as nested maps keyed by module field names, with every
//! tensor stored as a map holding its `bytes`, `shape` and `dtype`.
//! [`ParameterLayout`] deserializes such a record without knowing the model
//! type and keeps only that structure. It is read the same way from a weight
//! file and from an in-memory module, so the two can be compared before any
//! weights are loaded.

use anyhow::{Context, Result, anyhow};
use burn::{
    module::Module,
    record::{
        FullPrecisionSettings, NamedMpkBytesRecorder, NamedMpkFileRecorder, PrecisionSettings,
        Record, Recorder,
    },
    tensor::backend::Backend,
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{IgnoredAny, MapAccess, SeqAccess, Visitor},
    ser::{SerializeMap, SerializeSeq},
};
use std::fmt;
use std::path::Path;

use super::policy::ParameterShape;

/// Sequences longer than this are tensor payloads, not shapes or sub-modules
const MAX_KEPT_SEQ: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Map(Vec<(String, Node)>),
    Seq(Vec<Node>),
    Int(u64),
    Leaf,
}

impl Node {
    fn entry(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Shape of a serialized tensor, if this node is one
    fn tensor_shape(&self) -> Option<Vec<usize>> {
        self.entry("dtype")?;
        let Node::Seq(dims) = self.entry("shape")? else {
            return None;
        };
        dims.iter()
            .map(|dim| match dim {
                Node::Int(d) => usize::try_from(*d).ok(),
                _ => None,
            })
            .collect()
    }

    fn collect(&self, path: &mut Vec<String>, out: &mut Vec<ParameterShape>) {
        if let Some(shape) = self.tensor_shape() {
            out.push(ParameterShape::new(parameter_name(path), &shape));
            return;
        }

        match self {
            Node::Map(entries) => {
                for (key, child) in entries {
                    path.push(key.clone());
                    child.collect(path, out);
                    path.pop();
                }
            }
            Node::Seq(items) => {
                for (idx, child) in items.iter().enumerate() {
                    path.push(idx.to_string());
                    child.collect(path, out);
                    path.pop();
                }
            }
            Node::Int(_) | Node::Leaf => {}
        }
    }
}

/// Dotted name of a tensor, without the `param` wrapper level
fn parameter_name(path: &[String]) -> String {
    let segments = match path.split_last() {
        Some((last, rest)) if last == "param" => rest,
        _ => path,
    };
    segments.join(".")
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a serialized module record")
    }

    fn visit_bool<E>(self, _: bool) -> Result<Node, E> {
        Ok(Node::Leaf)
    }

    fn visit_i64<E>(self, v: i64) -> Result<Node, E> {
        Ok(u64::try_from(v).map(Node::Int).unwrap_or(Node::Leaf))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Node, E> {
        Ok(Node::Int(v))
    }

    fn visit_f64<E>(self, _: f64) -> Result<Node, E> {
        Ok(Node::Leaf)
    }

    fn visit_str<E>(self, _: &str) -> Result<Node, E> {
        Ok(Node::Leaf)
    }

    fn visit_bytes<E>(self, _: &[u8]) -> Result<Node, E> {
        Ok(Node::Leaf)
    }

    fn visit_none<E>(self) -> Result<Node, E> {
        Ok(Node::Leaf)
    }

    fn visit_unit<E>(self) -> Result<Node, E> {
        Ok(Node::Leaf)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        Node::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::new();
        while items.len() < MAX_KEPT_SEQ {
            match seq.next_element::<Node>()? {
                Some(item) => items.push(item),
                None => return Ok(Node::Seq(items)),
            }
        }
        if seq.next_element::<IgnoredAny>()?.is_none() {
            return Ok(Node::Seq(items));
        }
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Node::Leaf)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut entries = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, Node>()? {
            entries.push((key, value));
        }
        Ok(Node::Map(entries))
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Node::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Int(v) => serializer.serialize_u64(*v),
            Node::Leaf => serializer.serialize_unit(),
        }
    }
}

/// Structure of a module record, with tensor payloads dropped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterLayout {
    root: Node,
}

impl<B: Backend> Record<B> for ParameterLayout {
    type Item<S: PrecisionSettings> = ParameterLayout;

    fn into_item<S: PrecisionSettings>(self) -> Self::Item<S> {
        self
    }

    fn from_item<S: PrecisionSettings>(item: Self::Item<S>, _device: &B::Device) -> Self {
        item
    }
}

impl ParameterLayout {
    /// Layout of a weight file written by [`NamedMpkFileRecorder`]
    pub fn from_file<B: Backend>(path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        <NamedMpkFileRecorder<FullPrecisionSettings> as Recorder<B>>::load::<ParameterLayout>(
            &recorder,
            path.to_path_buf(),
            device,
        )
        .with_context(|| format!("Failed to read parameter layout from {:?}", path))
    }

    /// Layout of an in-memory module, encoded the same way a weight file is
    pub fn of_module<B: Backend, M: Module<B>>(module: &M) -> Result<Self> {
        let device = module
            .devices()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("module has no parameters"))?;

        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::new();
        let bytes = <NamedMpkBytesRecorder<FullPrecisionSettings> as Recorder<B>>::record(
            &recorder,
            module.clone().into_record(),
            (),
        )
        .context("Failed to encode module record")?;

        <NamedMpkBytesRecorder<FullPrecisionSettings> as Recorder<B>>::load::<ParameterLayout>(
            &recorder, bytes, &device,
        )
        .context("Failed to decode module record")
    }

    /// Every tensor by dotted name, in record order
    pub fn parameters(&self) -> Vec<ParameterShape> {
        let mut out = Vec::new();
        self.root.collect(&mut Vec::new(), &mut out);
        out
    }
}

/// Every learnable tensor of `module` by dotted name
pub fn module_parameters<B: Backend, M: Module<B>>(module: &M) -> Result<Vec<ParameterShape>> {
    Ok(ParameterLayout::of_module::<B, M>(module)?.parameters())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::NUM_ACTIONS;
    use crate::rl::{
        ConvPolicy, FullyConnectedPolicy, InferenceBackend, Policy, PolicyConfig, default_device,
    };

    #[test]
    fn test_fully_connected_parameters_follow_config() {
        let config = PolicyConfig::new(2, 4, 5);
        let policy = FullyConnectedPolicy::<InferenceBackend>::init(&config, &default_device());

        let params = module_parameters::<InferenceBackend, _>(&policy).unwrap();

        assert_eq!(params.len(), 6);
        assert_eq!(params[0], ParameterShape::new("fc1.weight", &[40, 200]));
        assert_eq!(params[1], ParameterShape::new("fc1.bias", &[200]));
        assert_eq!(params[5], ParameterShape::new("out.bias", &[NUM_ACTIONS]));
    }

    #[test]
    fn test_convolutional_parameters_follow_config() {
        let config = PolicyConfig::new(2, 4, 5);
        let policy = ConvPolicy::<InferenceBackend>::init(&config, &default_device());

        let params = module_parameters::<InferenceBackend, _>(&policy).unwrap();

        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "conv1.weight",
                "conv1.bias",
                "conv2.weight",
                "conv2.bias",
                "fc.weight",
                "fc.bias",
                "out.weight",
                "out.bias"
            ]
        );
        assert_eq!(params[0].shape, vec![16, 2, 3, 3]);
        assert_eq!(params[4].shape, vec![32 * 4 * 5, 200]);
    }

    #[test]
    fn test_layout_ignores_payloads() {
        let json = r#"{
            "fc": {
                "weight": {"id": "a", "param": {"bytes": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18], "shape": [3, 6], "dtype": "F32"}},
                "bias": null
            },
            "stride": [1, 1]
        }"#;
        let layout: ParameterLayout = serde_json::from_str(json).unwrap();

        assert_eq!(
            layout.parameters(),
            vec![ParameterShape::new("fc.weight", &[3, 6])]
        );
    }
}
