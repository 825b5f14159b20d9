//! Declarative image layers.
//!
//! A [`ContainerImage`] is an ordered list of [`Layer`]s, the declarative
//! equivalent of a Containerfile. It is plain data: rendering it is the only
//! thing this module does with it.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// A single declarative image layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Base image reference.
    From(String),
    /// Add files (archives are unpacked) into the image.
    Add { sources: Vec<String>, target: String },
    /// Copy files into the image.
    Copy { sources: Vec<String>, target: String },
    /// Run a command while building.
    Run {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Set environment variables.
    Env(BTreeMap<String, String>),
    /// Set the working directory.
    WorkingDirectory(String),
    /// Set the entrypoint.
    Entrypoint(Vec<String>),
    /// Set the default command.
    SetCommand(Vec<String>),
}

impl Layer {
    /// Render this layer as one Containerfile instruction.
    pub fn to_instruction(&self) -> String {
        match self {
            Self::From(base) => format!("FROM {}", base),
            Self::Add { sources, target } => format!("ADD {} {}", sources.join(" "), target),
            Self::Copy { sources, target } => format!("COPY {} {}", sources.join(" "), target),
            Self::Run { command, args } => {
                let argv: Vec<&str> = std::iter::once(command.as_str())
                    .chain(args.iter().map(String::as_str))
                    .collect();
                format!("RUN {}", exec_form(&argv))
            }
            Self::Env(vars) => {
                let mut line = String::from("ENV");
                for (name, value) in vars {
                    let _ = write!(line, " {}={}", name, quote(value));
                }
                line
            }
            Self::WorkingDirectory(dir) => format!("WORKDIR {}", dir),
            Self::Entrypoint(argv) => format!("ENTRYPOINT {}", exec_form(argv)),
            Self::SetCommand(argv) => format!("CMD {}", exec_form(argv)),
        }
    }
}

/// An ordered, declarative image specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerImage {
    layers: Vec<Layer>,
}

impl ContainerImage {
    /// Create an empty specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a specification from existing layers.
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// Builder method to start from a base image.
    pub fn from_(mut self, base: impl Into<String>) -> Self {
        self.layers.push(Layer::From(base.into()));
        self
    }

    /// Builder method to add files.
    pub fn add(mut self, sources: Vec<String>, target: impl Into<String>) -> Self {
        self.layers.push(Layer::Add {
            sources,
            target: target.into(),
        });
        self
    }

    /// Builder method to copy files.
    pub fn copy(mut self, sources: Vec<String>, target: impl Into<String>) -> Self {
        self.layers.push(Layer::Copy {
            sources,
            target: target.into(),
        });
        self
    }

    /// Builder method to run a command.
    pub fn run(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.layers.push(Layer::Run {
            command: command.into(),
            args,
        });
        self
    }

    /// Builder method to set one environment variable.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(name.into(), value.into());
        self.layers.push(Layer::Env(vars));
        self
    }

    /// Builder method to set the working directory.
    pub fn workingdir(mut self, dir: impl Into<String>) -> Self {
        self.layers.push(Layer::WorkingDirectory(dir.into()));
        self
    }

    /// Builder method to set the entrypoint.
    pub fn entrypoint(mut self, argv: Vec<String>) -> Self {
        self.layers.push(Layer::Entrypoint(argv));
        self
    }

    /// Builder method to set the default command.
    pub fn command(mut self, argv: Vec<String>) -> Self {
        self.layers.push(Layer::SetCommand(argv));
        self
    }

    /// Append every layer of `other` after the layers of `self`.
    pub fn extend(mut self, other: &ContainerImage) -> Self {
        self.layers.extend(other.layers.iter().cloned());
        self
    }

    /// All layers in order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Returns true if there are no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The first `From` layer, if any.
    pub fn base(&self) -> Option<&str> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::From(base) => Some(base.as_str()),
            _ => None,
        })
    }

    /// Environment declared by all `Env` layers; later layers win.
    pub fn declared_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for layer in &self.layers {
            if let Layer::Env(vars) = layer {
                env.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        env
    }

    /// Render as a Containerfile, one instruction per layer. `Env` layers
    /// without variables have no instruction and are skipped.
    pub fn to_containerfile(&self) -> String {
        let mut out = String::new();
        for layer in &self.layers {
            if matches!(layer, Layer::Env(vars) if vars.is_empty()) {
                continue;
            }
            out.push_str(&layer.to_instruction());
            out.push('\n');
        }
        out
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn exec_form<S: AsRef<str>>(argv: &[S]) -> String {
    let parts: Vec<String> = argv.iter().map(|a| quote(a.as_ref())).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_layers() -> ContainerImage {
        ContainerImage::new()
            .from_("docker.io/alpine:3.17")
            .run("apk", vec!["add".into(), "make".into()])
            .env("CC", "clang")
            .workingdir("/app")
    }

    #[test]
    fn test_to_containerfile() {
        let rendered = project_layers().to_containerfile();
        assert_eq!(
            rendered,
            "FROM docker.io/alpine:3.17\n\
             RUN [\"apk\", \"add\", \"make\"]\n\
             ENV CC=\"clang\"\n\
             WORKDIR /app\n"
        );
    }

    #[test]
    fn test_quote_escapes() {
        let layer = Layer::SetCommand(vec!["echo".into(), "say \"hi\"".into()]);
        assert_eq!(layer.to_instruction(), r#"CMD ["echo", "say \"hi\""]"#);
    }

    #[test]
    fn test_base_and_env() {
        let image = project_layers().env("CC", "gcc").env("CXX", "g++");
        assert_eq!(image.base(), Some("docker.io/alpine:3.17"));

        let env = image.declared_env();
        assert_eq!(env.get("CC").map(String::as_str), Some("gcc"));
        assert_eq!(env.get("CXX").map(String::as_str), Some("g++"));
    }

    #[test]
    fn test_extend_keeps_order() {
        let experiment = ContainerImage::new().run("make", vec![]);
        let derived = ContainerImage::new().from_("p1/group:HEAD").extend(&experiment);

        assert_eq!(derived.layers().len(), 2);
        assert_eq!(derived.base(), Some("p1/group:HEAD"));
        assert!(matches!(derived.layers()[1], Layer::Run { .. }));
    }

    #[test]
    fn test_deserialize_catalog_form() {
        let json = r#"[
            {"from": "alpine:3.17"},
            {"run": {"command": "make"}},
            {"env": {"CC": "clang"}}
        ]"#;
        let image: ContainerImage = serde_json::from_str(json).unwrap();

        assert_eq!(image.layers().len(), 3);
        assert_eq!(image.base(), Some("alpine:3.17"));
        assert_eq!(
            image.layers()[1],
            Layer::Run {
                command: "make".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_empty_env_layer_not_rendered() {
        let image: ContainerImage =
            serde_json::from_str(r#"[{"from": "alpine"}, {"env": {}}]"#).unwrap();

        assert_eq!(image.to_containerfile(), "FROM alpine\n");
    }
}
