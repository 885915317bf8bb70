//! Expansion of a parsed [`RegisterBlock`] into an accessor struct.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};

use crate::parse::{RegisterBlock, RegisterDef};

/// Generates the struct and its `impl` block.
pub fn generate(block: &RegisterBlock) -> TokenStream {
    let vis = &block.vis;
    let name = &block.name;
    let attrs = &block.attrs;

    let accessors = block.registers.iter().map(accessors);

    quote! {
        #(#attrs)*
        #[derive(Clone, Copy)]
        #vis struct #name<'bus> {
            bus: &'bus dyn ::sable_mmio::RegisterBus,
            base: u64,
        }

        impl<'bus> #name<'bus> {
            /// Creates an accessor for the block starting at `base` on `bus`.
            #[must_use]
            #vis const fn new(bus: &'bus dyn ::sable_mmio::RegisterBus, base: u64) -> Self {
                Self { bus, base }
            }

            /// Returns the block's base offset on the bus.
            #[must_use]
            #vis const fn base(&self) -> u64 {
                self.base
            }

            #(#accessors)*
        }
    }
}

/// Getter and/or setter for one register.
fn accessors(reg: &RegisterDef) -> TokenStream {
    let mut out = TokenStream::new();
    if reg.access.readable() {
        out.extend(getter(reg));
    }
    if reg.access.writable() {
        out.extend(setter(reg));
    }
    out
}

fn getter(reg: &RegisterDef) -> TokenStream {
    let name = &reg.name;
    let offset = &reg.offset;
    let attrs = &reg.attrs;
    let raw_ty = format_ident!("{}", reg.width.type_name());
    let read = format_ident!("read_{}", reg.width.type_name());

    match &reg.flags {
        Some(flags) => quote! {
            #(#attrs)*
            #[inline]
            #[must_use]
            pub fn #name(&self) -> #flags {
                #flags::from_bits_retain(self.bus.#read(self.base + #offset))
            }
        },
        None => quote! {
            #(#attrs)*
            #[inline]
            #[must_use]
            pub fn #name(&self) -> #raw_ty {
                self.bus.#read(self.base + #offset)
            }
        },
    }
}

fn setter(reg: &RegisterDef) -> TokenStream {
    let setter = format_ident!("set_{}", reg.name);
    let offset = &reg.offset;
    let raw_ty = format_ident!("{}", reg.width.type_name());
    let write = format_ident!("write_{}", reg.width.type_name());
    let doc = format!("Writes the `{}` register.", reg.name);

    match &reg.flags {
        Some(flags) => quote! {
            #[doc = #doc]
            #[inline]
            pub fn #setter(&self, value: #flags) {
                self.bus.#write(self.base + #offset, value.bits());
            }
        },
        None => quote! {
            #[doc = #doc]
            #[inline]
            pub fn #setter(&self, value: #raw_ty) {
                self.bus.#write(self.base + #offset, value);
            }
        },
    }
}
