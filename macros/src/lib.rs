//! Derive macros for Kitroom
//!
//! # Available Macros
//!
//! - `#[derive(Action)]` - Generates classification helpers for action enums
//!
//! # Example
//!
//! ```ignore
//! use kitroom_macros::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum LedgerAction {
//!     #[command]
//!     DeletePlan { plan_id: String },
//!
//!     #[event]
//!     SnapshotReceived { snapshot: CollectionSnapshot },
//!
//!     #[outcome]
//!     Committed { request_id: RequestId },
//! }
//!
//! assert!(LedgerAction::DeletePlan { plan_id: "pl-1".into() }.is_command());
//! assert_eq!(LedgerAction::DeletePlan { plan_id: "pl-1".into() }.action_name(), "DeletePlan");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Variant};

/// Derive macro for Action enums
///
/// Generates helper methods for action enums:
/// - `is_command()` - true for variants marked `#[command]` (intents from callers)
/// - `is_event()` - true for variants marked `#[event]` (facts from the outside world)
/// - `is_outcome()` - true for variants marked `#[outcome]` (results of a command)
/// - `action_name()` - the variant name, for logs and metrics labels
///
/// # Errors
///
/// Produces a compile error (not a runtime panic) if:
/// - Applied to a non-enum type
/// - A variant carries more than one of `#[command]`, `#[event]`, `#[outcome]`
///
/// # Example
///
/// ```ignore
/// #[derive(Action, Clone, Debug)]
/// enum CartAction {
///     #[command]
///     Add { item_id: String },
///
///     #[outcome]
///     Rejected(String),
///
///     Tick,
/// }
///
/// assert!(CartAction::Add { item_id: "cam-1".into() }.is_command());
/// assert!(!CartAction::Tick.is_command());
/// assert_eq!(CartAction::Tick.action_name(), "Tick");
/// ```
#[proc_macro_derive(Action, attributes(command, event, outcome))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(input, "#[derive(Action)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    let mut command_arms = Vec::new();
    let mut event_arms = Vec::new();
    let mut outcome_arms = Vec::new();
    let mut name_arms = Vec::new();

    for variant in &data_enum.variants {
        let is_command = has_attribute(&variant.attrs, "command");
        let is_event = has_attribute(&variant.attrs, "event");
        let is_outcome = has_attribute(&variant.attrs, "outcome");

        if [is_command, is_event, is_outcome].iter().filter(|b| **b).count() > 1 {
            return syn::Error::new_spanned(
                variant,
                "Variant can carry only one of #[command], #[event], #[outcome]",
            )
            .to_compile_error()
            .into();
        }

        let pattern = variant_pattern(variant);
        if is_command {
            command_arms.push(quote! { #pattern => true, });
        }
        if is_event {
            event_arms.push(quote! { #pattern => true, });
        }
        if is_outcome {
            outcome_arms.push(quote! { #pattern => true, });
        }

        let variant_name = variant.ident.to_string();
        name_arms.push(quote! { #pattern => #variant_name, });
    }

    let expanded = quote! {
        impl #name {
            /// Returns true if this action is a command
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_command(&self) -> bool {
                match self {
                    #(#command_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action is an event
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_event(&self) -> bool {
                match self {
                    #(#event_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action reports the outcome of a command
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_outcome(&self) -> bool {
                match self {
                    #(#outcome_arms)*
                    _ => false,
                }
            }

            /// Returns the variant name
            #[must_use]
            pub const fn action_name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Match pattern that ignores the variant's fields
fn variant_pattern(variant: &Variant) -> proc_macro2::TokenStream {
    let ident = &variant.ident;
    match &variant.fields {
        Fields::Named(_) => quote! { Self::#ident { .. } },
        Fields::Unnamed(_) => quote! { Self::#ident(..) },
        Fields::Unit => quote! { Self::#ident },
    }
}

fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}
