//! GLSL declaration reflection.
//!
//! The headless context has no shader compiler. It scans shader sources for
//! top-level declarations instead, which is enough to answer the program
//! introspection queries (`getActiveUniform`, `getActiveUniforms`,
//! `getUniformBlockIndex`, `getActiveAttrib`) the way a driver would for
//! shaders that use everything they declare.
//!
//! Diagnostics follow the driver convention `ERROR: 0:<line>: '<token>' : <text>`.

use crate::constants::*;

/// A loose (default block) uniform declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub type_: u32,
    /// Array length, 1 for non-arrays.
    pub size: i32,
    pub is_array: bool,
}

impl UniformDecl {
    /// Name reported by `getActiveUniform`: arrays end in `[0]`.
    pub fn active_name(&self) -> String {
        if self.is_array {
            format!("{}[0]", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// A member of a uniform block with its std140 byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMember {
    pub decl: UniformDecl,
    pub offset: u32,
}

/// A named uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlockDecl {
    pub name: String,
    /// Instance name, when the block is declared `uniform B { ... } inst;`.
    pub instance: Option<String>,
    pub members: Vec<BlockMember>,
    /// std140 size, rounded up to 16 bytes.
    pub data_size: u32,
}

impl UniformBlockDecl {
    /// Name reported for a member: prefixed with the block name when the
    /// block has an instance name.
    pub fn member_name(&self, member: &BlockMember) -> String {
        match self.instance {
            Some(_) => format!("{}.{}", self.name, member.decl.active_name()),
            None => member.decl.active_name(),
        }
    }
}

/// A vertex shader input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: String,
    pub type_: u32,
    pub size: i32,
    /// `layout(location = N)` when present.
    pub location: Option<u32>,
}

impl AttributeDecl {
    /// Number of consecutive locations the attribute occupies.
    pub fn slots(&self) -> u32 {
        matrix_columns(self.type_) * self.size.max(1) as u32
    }
}

/// Everything a compiled shader exposes to the linker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInterface {
    pub attributes: Vec<AttributeDecl>,
    pub uniforms: Vec<UniformDecl>,
    pub blocks: Vec<UniformBlockDecl>,
}

/// Scan `source` as a shader of `shader_type`, returning its interface or
/// the info log.
pub fn reflect(source: &str, shader_type: u32) -> Result<ShaderInterface, String> {
    let stripped = strip_comments(source);
    let code = strip_directives(&stripped)?;
    check_balance(&code)?;

    if !defines_main(&code) {
        return Err("ERROR: 0:0: 'main' : function not defined".to_string());
    }

    let mut interface = ShaderInterface::default();
    for (line, item) in top_level_items(&code) {
        parse_item(&item, line, shader_type, &mut interface)?;
    }
    Ok(interface)
}

/// GLSL type keyword to WebGL enumerant.
pub fn glsl_type(keyword: &str) -> Option<u32> {
    let value = match keyword {
        "float" => FLOAT,
        "vec2" => FLOAT_VEC2,
        "vec3" => FLOAT_VEC3,
        "vec4" => FLOAT_VEC4,
        "int" => INT,
        "ivec2" => INT_VEC2,
        "ivec3" => INT_VEC3,
        "ivec4" => INT_VEC4,
        "uint" => UNSIGNED_INT,
        "uvec2" => UNSIGNED_INT_VEC2,
        "uvec3" => UNSIGNED_INT_VEC3,
        "uvec4" => UNSIGNED_INT_VEC4,
        "bool" => BOOL,
        "bvec2" => BOOL_VEC2,
        "bvec3" => BOOL_VEC3,
        "bvec4" => BOOL_VEC4,
        "mat2" | "mat2x2" => FLOAT_MAT2,
        "mat3" | "mat3x3" => FLOAT_MAT3,
        "mat4" | "mat4x4" => FLOAT_MAT4,
        "mat2x3" => FLOAT_MAT2X3,
        "mat2x4" => FLOAT_MAT2X4,
        "mat3x2" => FLOAT_MAT3X2,
        "mat3x4" => FLOAT_MAT3X4,
        "mat4x2" => FLOAT_MAT4X2,
        "mat4x3" => FLOAT_MAT4X3,
        "sampler2D" => SAMPLER_2D,
        "sampler3D" => SAMPLER_3D,
        "samplerCube" => SAMPLER_CUBE,
        "sampler2DShadow" => SAMPLER_2D_SHADOW,
        "sampler2DArray" => SAMPLER_2D_ARRAY,
        "sampler2DArrayShadow" => SAMPLER_2D_ARRAY_SHADOW,
        "samplerCubeShadow" => SAMPLER_CUBE_SHADOW,
        "isampler2D" => INT_SAMPLER_2D,
        "isampler3D" => INT_SAMPLER_3D,
        "isamplerCube" => INT_SAMPLER_CUBE,
        "isampler2DArray" => INT_SAMPLER_2D_ARRAY,
        "usampler2D" => UNSIGNED_INT_SAMPLER_2D,
        "usampler3D" => UNSIGNED_INT_SAMPLER_3D,
        "usamplerCube" => UNSIGNED_INT_SAMPLER_CUBE,
        "usampler2DArray" => UNSIGNED_INT_SAMPLER_2D_ARRAY,
        _ => return None,
    };
    Some(value)
}

/// Columns of a matrix type, 1 for everything else.
pub fn matrix_columns(type_: u32) -> u32 {
    match type_ {
        FLOAT_MAT2 | FLOAT_MAT2X3 | FLOAT_MAT2X4 => 2,
        FLOAT_MAT3 | FLOAT_MAT3X2 | FLOAT_MAT3X4 => 3,
        FLOAT_MAT4 | FLOAT_MAT4X2 | FLOAT_MAT4X3 => 4,
        _ => 1,
    }
}

/// Whether the type is an opaque sampler.
pub fn is_sampler(type_: u32) -> bool {
    matches!(
        type_,
        SAMPLER_2D
            | SAMPLER_3D
            | SAMPLER_CUBE
            | SAMPLER_2D_SHADOW
            | SAMPLER_2D_ARRAY
            | SAMPLER_2D_ARRAY_SHADOW
            | SAMPLER_CUBE_SHADOW
            | INT_SAMPLER_2D
            | INT_SAMPLER_3D
            | INT_SAMPLER_CUBE
            | INT_SAMPLER_2D_ARRAY
            | UNSIGNED_INT_SAMPLER_2D
            | UNSIGNED_INT_SAMPLER_3D
            | UNSIGNED_INT_SAMPLER_CUBE
            | UNSIGNED_INT_SAMPLER_2D_ARRAY
    )
}

/// std140 base alignment and size of a single (non-array) value.
fn std140_layout(type_: u32) -> (u32, u32) {
    match type_ {
        FLOAT | INT | UNSIGNED_INT | BOOL => (4, 4),
        FLOAT_VEC2 | INT_VEC2 | UNSIGNED_INT_VEC2 | BOOL_VEC2 => (8, 8),
        FLOAT_VEC3 | INT_VEC3 | UNSIGNED_INT_VEC3 | BOOL_VEC3 => (16, 12),
        FLOAT_VEC4 | INT_VEC4 | UNSIGNED_INT_VEC4 | BOOL_VEC4 => (16, 16),
        // Column-major: each column is padded to a vec4.
        _ => (16, matrix_columns(type_) * 16),
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

// ==================== Source preprocessing ====================

/// Remove `//` and `/* */` comments, keeping newlines so line numbers hold.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Blank out preprocessor lines, failing on `#error`.
fn strip_directives(source: &str) -> Result<String, String> {
    let mut out = String::with_capacity(source.len());
    for (index, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            let rest = rest.trim_start();
            if let Some(message) = rest.strip_prefix("error") {
                return Err(format!(
                    "ERROR: 0:{}: '#error' : {}",
                    index + 1,
                    message.trim()
                ));
            }
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    Ok(out)
}

fn check_balance(code: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    for c in code.chars() {
        match c {
            '\n' => line += 1,
            '{' | '(' | '[' => stack.push((c, line)),
            '}' | ')' | ']' => {
                let expected = match c {
                    '}' => '{',
                    ')' => '(',
                    _ => '[',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => return Err(format!("ERROR: 0:{line}: '{c}' : syntax error")),
                }
            }
            _ => {}
        }
    }
    match stack.last() {
        Some((open, line)) => Err(format!(
            "ERROR: 0:{line}: '{open}' : syntax error, unexpected end of file"
        )),
        None => Ok(()),
    }
}

fn defines_main(code: &str) -> bool {
    let spaced = code.replace('(', " ( ");
    let tokens: Vec<&str> = spaced.split_whitespace().collect();
    tokens
        .windows(3)
        .any(|w| w[0] == "void" && w[1] == "main" && w[2] == "(")
}

/// Split code into top-level items: declarations ending in `;` and function
/// definitions ending in their closing brace. Each item carries its line.
fn top_level_items(code: &str) -> Vec<(usize, String)> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut depth = 0usize;

    for c in code.chars() {
        if c == '\n' {
            line += 1;
        }
        if current.trim().is_empty() && !c.is_whitespace() {
            start_line = line;
        }
        match c {
            '{' | '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            '}' | ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
                if c == '}' && depth == 0 && is_function_definition(&current) {
                    items.push((start_line, std::mem::take(&mut current)));
                }
            }
            ';' if depth == 0 => {
                items.push((start_line, std::mem::take(&mut current)));
            }
            _ => current.push(c),
        }
    }
    items
}

fn is_function_definition(item: &str) -> bool {
    let (_, rest) = take_layout(item);
    match (rest.find('('), rest.find('{')) {
        (Some(paren), Some(brace)) => paren < brace,
        _ => false,
    }
}

// ==================== Declarations ====================

const IGNORED_QUALIFIERS: &[&str] = &[
    "highp",
    "mediump",
    "lowp",
    "flat",
    "smooth",
    "centroid",
    "invariant",
    "const",
];

/// Remove a leading `layout(...)` qualifier, returning its `location`.
fn take_layout(item: &str) -> (Option<u32>, &str) {
    let trimmed = item.trim_start();
    let Some(rest) = trimmed.strip_prefix("layout") else {
        return (None, trimmed);
    };
    let rest = rest.trim_start();
    let (Some(open), Some(close)) = (rest.find('('), rest.find(')')) else {
        return (None, trimmed);
    };
    if open != 0 {
        return (None, trimmed);
    }
    let location = rest[1..close].split(',').find_map(|qualifier| {
        let (key, value) = qualifier.split_once('=')?;
        if key.trim() == "location" {
            value.trim().parse().ok()
        } else {
            None
        }
    });
    (location, &rest[close + 1..])
}

/// Parse `name`, `name[N]` or `name = init`.
fn parse_declarator(declarator: &str) -> Option<(String, i32, bool)> {
    let declarator = declarator.split('=').next()?.trim();
    if declarator.is_empty() {
        return None;
    }
    match declarator.split_once('[') {
        Some((name, rest)) => {
            let len = rest.trim_end_matches(']').trim().parse().unwrap_or(1);
            Some((name.trim().to_string(), len, true))
        }
        None => Some((declarator.to_string(), 1, false)),
    }
}

fn syntax_error(line: usize, token: &str) -> String {
    format!("ERROR: 0:{line}: '{token}' : syntax error")
}

fn parse_item(
    item: &str,
    line: usize,
    shader_type: u32,
    interface: &mut ShaderInterface,
) -> Result<(), String> {
    if is_function_definition(item) || item.trim().is_empty() {
        return Ok(());
    }

    let (location, rest) = take_layout(item);

    if let Some(brace) = rest.find('{') {
        let head: Vec<&str> = rest[..brace].split_whitespace().collect();
        if head.first() != Some(&"uniform") {
            // struct definitions and other blocks carry nothing to report
            return Ok(());
        }
        let name = head
            .get(1)
            .ok_or_else(|| syntax_error(line, "{"))?
            .to_string();
        let close = rest.rfind('}').ok_or_else(|| syntax_error(line, "{"))?;
        let instance = rest[close + 1..]
            .split('[')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let block = parse_block(name, instance, &rest[brace + 1..close], line)?;
        interface.blocks.push(block);
        return Ok(());
    }

    let mut tokens: Vec<&str> = rest
        .split_whitespace()
        .filter(|t| !IGNORED_QUALIFIERS.contains(t))
        .collect();
    let Some(&storage) = tokens.first() else {
        return Ok(());
    };

    let is_attribute = match storage {
        "attribute" => true,
        "in" => shader_type == VERTEX_SHADER,
        "uniform" => false,
        _ => return Ok(()),
    };
    tokens.remove(0);

    let Some((&type_name, declarators)) = tokens.split_first() else {
        return Err(syntax_error(line, storage));
    };
    let Some(type_) = glsl_type(type_name) else {
        tracing::debug!(type_name, "skipping declaration of unsupported type");
        return Ok(());
    };

    for declarator in declarators.join(" ").split(',') {
        let (name, size, is_array) =
            parse_declarator(declarator).ok_or_else(|| syntax_error(line, type_name))?;
        if is_attribute {
            interface.attributes.push(AttributeDecl {
                name,
                type_,
                size,
                location,
            });
        } else if storage == "uniform" {
            interface.uniforms.push(UniformDecl {
                name,
                type_,
                size,
                is_array,
            });
        }
    }
    Ok(())
}

fn parse_block(
    name: String,
    instance: Option<String>,
    body: &str,
    line: usize,
) -> Result<UniformBlockDecl, String> {
    let mut members = Vec::new();
    let mut offset = 0u32;

    for member in body.split(';') {
        let (_, member) = take_layout(member);
        let tokens: Vec<&str> = member
            .split_whitespace()
            .filter(|t| {
                !IGNORED_QUALIFIERS.contains(t) && *t != "row_major" && *t != "column_major"
            })
            .collect();
        let Some((&type_name, declarators)) = tokens.split_first() else {
            continue;
        };
        let type_ = glsl_type(type_name).ok_or_else(|| syntax_error(line, type_name))?;

        for declarator in declarators.join(" ").split(',') {
            let (member_name, size, is_array) =
                parse_declarator(declarator).ok_or_else(|| syntax_error(line, type_name))?;
            let (align, single) = std140_layout(type_);
            let (align, total) = if is_array {
                let stride = round_up(single, 16);
                (16, stride * size.max(1) as u32)
            } else {
                (align, single)
            };
            offset = round_up(offset, align);
            members.push(BlockMember {
                decl: UniformDecl {
                    name: member_name,
                    type_,
                    size,
                    is_array,
                },
                offset,
            });
            offset += total;
        }
    }

    Ok(UniformBlockDecl {
        name,
        instance,
        members,
        data_size: round_up(offset, 16),
    })
}
