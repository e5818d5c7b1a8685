//! Chunk rendering and output naming.

use std::collections::{BTreeMap, HashMap};

use bunkatsu_graph::ModuleGraph;
use bunkatsu_manifest::{ChunkKind, Fingerprint};
use tracing::debug;

use crate::BundleError;
use crate::config::OutputConfig;
use crate::selector::Partition;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Name,
    Id,
    ContentHash(Option<usize>),
}

/// A parsed output file name template.
///
/// Supported placeholders: `[name]`, `[id]`, `[contenthash]` and
/// `[contenthash:N]` (first `N` hex characters of the fingerprint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    segments: Vec<Segment>,
}

impl OutputTemplate {
    pub fn parse(template: &str) -> Result<Self, BundleError> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('[') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find(']').ok_or_else(|| {
                BundleError::config(format!("Unclosed placeholder in template '{template}'"))
            })?;
            segments.push(parse_placeholder(&after[..close], template)?);
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Returns true if rendered names change with content.
    pub fn has_content_hash(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::ContentHash(_)))
    }

    pub fn render(&self, name: &str, id: &str, fingerprint: &Fingerprint) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Name => out.push_str(name),
                Segment::Id => out.push_str(id),
                Segment::ContentHash(None) => out.push_str(fingerprint.as_str()),
                Segment::ContentHash(Some(len)) => out.push_str(fingerprint.short(*len)),
            }
        }
        out
    }
}

fn parse_placeholder(inner: &str, template: &str) -> Result<Segment, BundleError> {
    match inner.split_once(':') {
        None => match inner {
            "name" => Ok(Segment::Name),
            "id" => Ok(Segment::Id),
            "contenthash" => Ok(Segment::ContentHash(None)),
            _ => Err(BundleError::config(format!(
                "Unknown placeholder '[{inner}]' in template '{template}'"
            ))),
        },
        Some(("contenthash", len)) => match len.parse::<usize>() {
            Ok(len @ 1..=64) => Ok(Segment::ContentHash(Some(len))),
            _ => Err(BundleError::config(format!(
                "Invalid hash length '{len}' in template '{template}'"
            ))),
        },
        Some(_) => Err(BundleError::config(format!(
            "Unknown placeholder '[{inner}]' in template '{template}'"
        ))),
    }
}

/// A rendered chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Index into the partition's chunk list.
    pub chunk: usize,
    pub chunk_id: String,
    pub name: String,
    pub kind: ChunkKind,
    pub output_path: String,
    pub fingerprint: Fingerprint,
    pub contents: Vec<u8>,
}

/// Renders chunks and names their output files.
#[derive(Debug, Clone)]
pub struct Emitter {
    filename: OutputTemplate,
    chunk_filename: OutputTemplate,
}

impl Emitter {
    pub fn new(output: &OutputConfig) -> Result<Self, BundleError> {
        Ok(Self {
            filename: OutputTemplate::parse(&output.filename)?,
            chunk_filename: OutputTemplate::parse(&output.chunk_filename)?,
        })
    }

    /// Renders every chunk of the partition, in partition order.
    ///
    /// The runtime chunk is rendered last because it embeds the output path
    /// of every other chunk.
    pub fn emit(
        &self,
        graph: &ModuleGraph,
        partition: &Partition,
        module_ids: &[String],
        chunk_ids: &[String],
    ) -> Result<Vec<Asset>, BundleError> {
        let mut assets: Vec<Option<Asset>> = vec![None; partition.chunks.len()];

        for (index, chunk) in partition.chunks.iter().enumerate() {
            if chunk.kind == ChunkKind::Runtime {
                continue;
            }
            let mut body =
                format!("/*! bunkatsu chunk \"{}\" ({}) */\n", chunk.name, chunk_ids[index]).into_bytes();
            for &position in &chunk.modules {
                let module = &graph.modules()[position];
                body.extend_from_slice(
                    format!("/* module {} {} */\n", module_ids[position], module.id).as_bytes(),
                );
                body.extend_from_slice(&module.source);
                if !module.source.ends_with(b"\n") {
                    body.push(b'\n');
                }
            }
            assets[index] = Some(self.finish(index, chunk.kind, &chunk.name, &chunk_ids[index], body));
        }

        if let Some(index) = partition
            .chunks
            .iter()
            .position(|c| c.kind == ChunkKind::Runtime)
        {
            let chunk_map: BTreeMap<&str, &str> = assets
                .iter()
                .flatten()
                .map(|a| (a.chunk_id.as_str(), a.output_path.as_str()))
                .collect();
            let module_map: BTreeMap<&str, &str> = partition
                .owner
                .iter()
                .enumerate()
                .map(|(position, &chunk)| (module_ids[position].as_str(), chunk_ids[chunk].as_str()))
                .collect();

            let name = &partition.chunks[index].name;
            let body = format!(
                "/*! bunkatsu runtime \"{}\" ({}) */\nvar __bunkatsu = {{\"chunks\":{},\"modules\":{}}};\n",
                name,
                chunk_ids[index],
                serde_json::to_string(&chunk_map)?,
                serde_json::to_string(&module_map)?,
            );
            assets[index] = Some(self.finish(
                index,
                ChunkKind::Runtime,
                name,
                &chunk_ids[index],
                body.into_bytes(),
            ));
        }

        let assets: Vec<Asset> = assets.into_iter().flatten().collect();

        let mut seen: HashMap<&str, &str> = HashMap::new();
        for asset in &assets {
            if let Some(other) = seen.insert(asset.output_path.as_str(), asset.name.as_str()) {
                return Err(BundleError::config(format!(
                    "Chunks '{}' and '{}' both write '{}'",
                    other, asset.name, asset.output_path
                )));
            }
        }

        Ok(assets)
    }

    fn finish(&self, chunk: usize, kind: ChunkKind, name: &str, id: &str, contents: Vec<u8>) -> Asset {
        let fingerprint = Fingerprint::of(&contents);
        let template = match kind {
            ChunkKind::Runtime | ChunkKind::Entry => &self.filename,
            ChunkKind::Group | ChunkKind::Common => &self.chunk_filename,
        };
        let output_path = template.render(name, id, &fingerprint);
        debug!("{} -> {} ({} bytes)", name, output_path, contents.len());

        Asset {
            chunk,
            chunk_id: id.to_string(),
            name: name.to_string(),
            kind,
            output_path,
            fingerprint,
            contents,
        }
    }
}
