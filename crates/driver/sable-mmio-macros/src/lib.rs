//! Proc-macro crate for the `register_block!` register DSL.
//!
//! Expands a declarative register map into a small accessor struct that reads
//! and writes through a `sable_mmio::RegisterBus`. The bus decides what a
//! register access means: volatile MMIO on hardware, a modelled device in
//! tests.

mod codegen;
mod parse;

use proc_macro::TokenStream;
use syn::parse_macro_input;

use crate::parse::RegisterBlock;

/// Generates a typed register block accessor.
///
/// # Syntax
///
/// ```ignore
/// register_block! {
///     /// Doc comment for the struct.
///     pub StructName {
///         /// Doc comment for the register.
///         [offset; width; access_mode] name => OptionalBitflagsType,
///     }
/// }
/// ```
///
/// - `offset`: byte offset from the block base, aligned to `width`
/// - `width`: `u8`, `u16`, `u32` or `u64`
/// - `access_mode`: `ro`, `wo` or `rw`
/// - `=> Type`: optional bitflags type (`from_bits_retain` / `bits`)
///
/// # Generated code
///
/// A `Copy` struct `StructName<'bus>` holding the bus and a base offset, with
/// `new(bus, base)`, `base()`, and per register:
/// - `ro`/`rw`: `fn name(&self) -> Type`
/// - `wo`/`rw`: `fn set_name(&self, value: Type)`
///
/// # Example
///
/// ```ignore
/// use sable_mmio::register_block;
///
/// register_block! {
///     /// AHCI generic host control.
///     pub HbaRegs {
///         /// Host Capabilities.
///         [0x00; u32; ro] cap => HbaCap,
///         /// Global Host Control.
///         [0x04; u32; rw] ghc => HbaGhc,
///         /// Ports Implemented.
///         [0x0C; u32; ro] pi,
///     }
/// }
/// ```
#[proc_macro]
pub fn register_block(input: TokenStream) -> TokenStream {
    let block = parse_macro_input!(input as RegisterBlock);
    codegen::generate(&block).into()
}
