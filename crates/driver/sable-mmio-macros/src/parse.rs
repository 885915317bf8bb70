//! Parser for the `register_block!` input.

use syn::parse::{Parse, ParseStream};
use syn::{Attribute, Ident, LitInt, Token, Visibility, braced, bracketed};

/// A parsed register block.
pub struct RegisterBlock {
    /// Attributes (docs) placed on the generated struct.
    pub attrs: Vec<Attribute>,
    /// Visibility of the generated struct and its constructor.
    pub vis: Visibility,
    /// Name of the generated struct.
    pub name: Ident,
    /// Registers in declaration order.
    pub registers: Vec<RegisterDef>,
}

/// Which accessors a register gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Getter only.
    ReadOnly,
    /// Setter only.
    WriteOnly,
    /// Getter and setter.
    ReadWrite,
}

impl AccessMode {
    pub fn readable(self) -> bool {
        self != Self::WriteOnly
    }

    pub fn writable(self) -> bool {
        self != Self::ReadOnly
    }
}

/// Register width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWidth {
    U8,
    U16,
    U32,
    U64,
}

impl RegWidth {
    fn from_ident(ident: &Ident) -> syn::Result<Self> {
        match ident.to_string().as_str() {
            "u8" => Ok(Self::U8),
            "u16" => Ok(Self::U16),
            "u32" => Ok(Self::U32),
            "u64" => Ok(Self::U64),
            _ => Err(syn::Error::new(
                ident.span(),
                "register width must be one of u8, u16, u32, u64",
            )),
        }
    }

    /// Primitive type name, also the suffix of the bus method (`read_u32`).
    pub fn type_name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
        }
    }

    /// Width in bytes.
    pub fn bytes(self) -> u64 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }
}

/// One register line.
pub struct RegisterDef {
    /// Attributes (docs) on the getter.
    pub attrs: Vec<Attribute>,
    /// Byte offset from the block base.
    pub offset: LitInt,
    /// Width.
    pub width: RegWidth,
    /// Access mode.
    pub access: AccessMode,
    /// Register name; the setter is `set_<name>`.
    pub name: Ident,
    /// Optional bitflags type the raw value is wrapped in.
    pub flags: Option<Ident>,
}

impl Parse for RegisterBlock {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let vis: Visibility = input.parse()?;
        let name: Ident = input.parse()?;

        let body;
        braced!(body in input);

        let mut registers: Vec<RegisterDef> = Vec::new();
        while !body.is_empty() {
            let reg = body.call(parse_register)?;
            if registers.iter().any(|r| r.name == reg.name) {
                return Err(syn::Error::new(
                    reg.name.span(),
                    format!("register `{}` is declared twice", reg.name),
                ));
            }
            registers.push(reg);
        }

        Ok(Self {
            attrs,
            vis,
            name,
            registers,
        })
    }
}

/// Parses `#[attrs] [offset; width; mode] name (=> Flags)?,`.
fn parse_register(input: ParseStream) -> syn::Result<RegisterDef> {
    let attrs = input.call(Attribute::parse_outer)?;

    let spec;
    bracketed!(spec in input);

    let offset: LitInt = spec.parse()?;
    spec.parse::<Token![;]>()?;
    let width = RegWidth::from_ident(&spec.parse()?)?;
    spec.parse::<Token![;]>()?;

    let mode: Ident = spec.parse()?;
    let access = match mode.to_string().as_str() {
        "ro" => AccessMode::ReadOnly,
        "wo" => AccessMode::WriteOnly,
        "rw" => AccessMode::ReadWrite,
        _ => {
            return Err(syn::Error::new(
                mode.span(),
                "access mode must be one of ro, wo, rw",
            ));
        }
    };

    let value: u64 = offset.base10_parse()?;
    if value % width.bytes() != 0 {
        return Err(syn::Error::new(
            offset.span(),
            format!(
                "offset {value:#x} is not aligned to the {}-byte register width",
                width.bytes()
            ),
        ));
    }

    let name: Ident = input.parse()?;

    let flags = if input.peek(Token![=>]) {
        input.parse::<Token![=>]>()?;
        Some(input.parse::<Ident>()?)
    } else {
        None
    };

    if !input.is_empty() {
        input.parse::<Token![,]>()?;
    }

    Ok(RegisterDef {
        attrs,
        offset,
        width,
        access,
        name,
        flags,
    })
}
