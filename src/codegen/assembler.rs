//! Stage Assembler
//!
//! Renders a finalized [`CodegenOutput`] into complete stage sources using
//! minijinja templates embedded with `rust-embed`.
//!
//! Templates use a GLSL-friendly syntax so that braces in shader code never
//! collide with template blocks:
//!
//! | Construct | Syntax |
//! |-----------|--------|
//! | Block     | `{$ if surface $} ... {$ endif $}` |
//! | Variable  | `{{ surface }}` |
//! | Line      | `$$ for input in vertex_inputs` |
//!
//! In debug builds on native targets the loader reads templates straight from
//! `src/codegen/shaders`, so template edits apply without rebuilding.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use serde::Serialize;

use super::create_info::{CreateInfo, ShaderStage, VertexInput};
use super::CodegenOutput;
use crate::errors::{Result, ShaderGraphError};

static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/codegen/shaders"]
struct ShaderTemplates;

pub fn template_env() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(|| {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
            .expect("Failed to configure template syntax");

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
        env.set_loader(template_loader);

        env
    })
}

fn template_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("glsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.glsl"))
    };

    #[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
    {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("src/codegen/shaders")
            .join(filename.as_ref());
        if path.exists() {
            return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("Failed to read {}: {e}", path.display()),
                )
            });
        }
    }

    if let Some(file) = ShaderTemplates::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

#[derive(Serialize)]
struct StageContext<'a> {
    #[serde(flatten)]
    defines: BTreeMap<String, String>,
    stage: &'static str,
    define_lines: String,
    uniforms: &'a str,
    attribs: &'a str,
    resources: &'a str,
    surface: Option<&'a str>,
    volume: Option<&'a str>,
    displacement: Option<&'a str>,
    thickness: Option<&'a str>,
    aovs: Option<&'a str>,
    functions: Option<&'a str>,
    composites: Option<&'a str>,
    vertex_inputs: &'a [VertexInput],
    stage_code: &'a str,
}

pub struct ShaderAssembler;

impl ShaderAssembler {
    /// Renders every stage selected in `output.templates`.
    pub fn assemble(output: &CodegenOutput) -> Result<CreateInfo> {
        let render = |stage: ShaderStage, template: Option<&str>, code: &str| {
            template
                .map(|name| Self::render_stage(output, stage, name, code))
                .transpose()
        };

        let vertex_source = render(
            ShaderStage::Vertex,
            output.templates.vertex.as_deref(),
            &output.vertex_code,
        )?;
        let fragment_source = render(
            ShaderStage::Fragment,
            output.templates.fragment.as_deref(),
            &output.fragment_code,
        )?;
        let compute_source = render(
            ShaderStage::Compute,
            output.templates.compute.as_deref(),
            &output.compute_code,
        )?;

        Ok(CreateInfo {
            name: output.name.clone(),
            vertex_inputs: output.vertex_inputs.clone(),
            samplers: output.samplers.clone(),
            uniform_buffers: output.uniform_buffers.clone(),
            defines: output.defines.clone(),
            vertex_source,
            fragment_source,
            compute_source,
        })
    }

    fn render_stage(
        output: &CodegenOutput,
        stage: ShaderStage,
        template_name: &str,
        stage_code: &str,
    ) -> Result<String> {
        let template = template_env()
            .get_template(template_name)
            .map_err(|e| match e.kind() {
                ErrorKind::TemplateNotFound => {
                    ShaderGraphError::UnknownTemplate(template_name.to_owned())
                }
                _ => ShaderGraphError::Template(e),
            })?;

        let ctx = StageContext {
            defines: output.defines.to_map(),
            stage: stage.label(),
            define_lines: output.defines.to_glsl(),
            uniforms: &output.uniforms,
            attribs: &output.attribs,
            resources: &output.resources,
            surface: output.surface.as_deref(),
            volume: output.volume.as_deref(),
            displacement: output.displacement.as_deref(),
            thickness: output.thickness.as_deref(),
            aovs: output.aovs.as_deref(),
            functions: output.functions.as_deref(),
            composites: output.composites.as_deref(),
            vertex_inputs: &output.vertex_inputs,
            stage_code,
        };

        let source = template.render(&ctx)?;
        Ok(format!("// === Auto-generated node tree shader ===\n{source}"))
    }
}
