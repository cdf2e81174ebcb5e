use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::info;

use crate::identifier::Identifier;
use crate::registry::{ScaleKindDef, DEFAULT_BASE_SCALE, DEFAULT_TICK_DELAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateKind,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

pub fn compile_scale_kind_defs(dir: &Path) -> Result<Vec<ScaleKindDef>, ContentCompileError> {
    let xml_files = collect_xml_files_sorted(dir)
        .map_err(|error| read_error(error.path, error.source))?;

    let mut seen = HashSet::<Identifier>::new();
    let mut defs = Vec::<ScaleKindDef>::new();
    for xml_file in &xml_files {
        let raw = fs::read_to_string(xml_file)
            .map_err(|source| read_error(xml_file.clone(), source))?;
        for def in parse_defs_document(xml_file, &raw)? {
            if !seen.insert(def.id.clone()) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::DuplicateKind,
                    message: format!(
                        "duplicate ScaleKindDef '{}'; each kind may be defined only once",
                        def.id
                    ),
                    file_path: xml_file.clone(),
                    location: None,
                });
            }
            defs.push(def);
        }
    }

    info!(
        dir = %dir.display(),
        files = xml_files.len(),
        kinds = defs.len(),
        "scale_kind_defs_compiled"
    );
    Ok(defs)
}

pub fn parse_defs_document(
    file_path: &Path,
    raw: &str,
) -> Result<Vec<ScaleKindDef>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(error_at_node(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            file_path,
            &doc,
            root,
        ));
    }

    let mut defs = Vec::<ScaleKindDef>::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "ScaleKindDef" {
            return Err(error_at_node(
                ContentErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; expected <ScaleKindDef>",
                    child.tag_name().name()
                ),
                file_path,
                &doc,
                child,
            ));
        }
        defs.push(parse_scale_kind_def(file_path, &doc, child)?);
    }
    Ok(defs)
}

fn parse_scale_kind_def(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<ScaleKindDef, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut id: Option<Identifier> = None;
    let mut default_base_scale: Option<f32> = None;
    let mut default_tick_delay: Option<u32> = None;
    let mut modifiers = Vec::<Identifier>::new();

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <ScaleKindDef>"),
                file_path,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "id" => {
                id = Some(identifier_text(file_path, doc, field, "id")?);
            }
            "defaultBaseScale" => {
                let value = required_text(file_path, doc, field, "defaultBaseScale")?;
                let parsed = value.parse::<f32>().map_err(|_| {
                    error_at_node(
                        ContentErrorCode::InvalidValue,
                        format!("defaultBaseScale '{value}' is not a valid number"),
                        file_path,
                        doc,
                        field,
                    )
                })?;
                if !parsed.is_finite() {
                    return Err(error_at_node(
                        ContentErrorCode::InvalidValue,
                        "defaultBaseScale must be finite".to_string(),
                        file_path,
                        doc,
                        field,
                    ));
                }
                default_base_scale = Some(parsed);
            }
            "defaultTickDelay" => {
                let value = required_text(file_path, doc, field, "defaultTickDelay")?;
                let parsed = value.parse::<u32>().map_err(|_| {
                    error_at_node(
                        ContentErrorCode::InvalidValue,
                        format!("defaultTickDelay '{value}' is not a non-negative integer"),
                        file_path,
                        doc,
                        field,
                    )
                })?;
                default_tick_delay = Some(parsed);
            }
            "modifiers" => {
                for item in field.children().filter(|child| child.is_element()) {
                    if item.tag_name().name() != "li" {
                        return Err(error_at_node(
                            ContentErrorCode::UnknownField,
                            format!(
                                "unexpected <{}> in <modifiers>; expected <li>",
                                item.tag_name().name()
                            ),
                            file_path,
                            doc,
                            item,
                        ));
                    }
                    modifiers.push(identifier_text(file_path, doc, item, "li")?);
                }
            }
            _ => {
                return Err(error_at_node(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <ScaleKindDef>"),
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let Some(id) = id else {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            "missing required field <id> in <ScaleKindDef>".to_string(),
            file_path,
            doc,
            node,
        ));
    };

    Ok(ScaleKindDef {
        id,
        default_base_scale: default_base_scale.unwrap_or(DEFAULT_BASE_SCALE),
        default_tick_delay: default_tick_delay.unwrap_or(DEFAULT_TICK_DELAY),
        default_modifiers: modifiers,
    })
}

fn identifier_text(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<Identifier, ContentCompileError> {
    let value = required_text(file_path, doc, node, field_name)?;
    Identifier::parse(&value).map_err(|error| {
        error_at_node(
            ContentErrorCode::InvalidValue,
            format!("field <{field_name}>: {error}"),
            file_path,
            doc,
            node,
        )
    })
}

fn required_text(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ContentCompileError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            format!("field <{field_name}> must not be empty"),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn error_at_node(
    code: ContentErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ContentCompileError {
    let pos = doc.text_pos_at(node.range().start);
    ContentCompileError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_cached_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read scale definitions: {source}"),
        file_path: path,
        location: None,
    }
}
