//! Overload resolution.
//!
//! Resolution runs in two phases. Phase one considers candidates whose
//! parameter count equals the argument count (a variadic candidate may be
//! called with an array in its variadic slot). Only when phase one finds no
//! applicable candidate does phase two expand variadic tails.
//!
//! Within a phase every applicable candidate gets a [`Cost`]. The candidates
//! with the most exact argument matches survive; among those, a candidate is
//! discarded when another one needs no more widenings and no more boxings and
//! strictly fewer of one of them. If the survivors still differ in cost (one
//! needs fewer widenings, the other fewer boxings) the call is ambiguous.
//! Survivors with identical cost are narrowed to the most specific one
//! (every parameter convertible to the other's without boxing); anything
//! left tied is ambiguous. Resolution never picks arbitrarily.

use std::collections::BTreeMap;

use derive_more::{Display, Error};
use trellis_core::unit::Conversion;
use trellis_core::{Signature, TypeArg, TypeRef};

use crate::classes::ClassTable;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Cost {
    pub exact: usize,
    pub widening: usize,
    pub boxing: usize,
}

impl Cost {
    fn dominates(&self, other: &Cost) -> bool {
        self.widening <= other.widening
            && self.boxing <= other.boxing
            && (self.widening < other.widening || self.boxing < other.boxing)
    }
}

/// The winning candidate, instantiated for the call site.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Resolved {
    /// Index into the candidate slice.
    pub index: usize,
    /// Parameter type each argument is converted to.
    pub params: Vec<TypeRef>,
    /// Conversions applied to each argument.
    pub coercions: Vec<Vec<Conversion>>,
    /// Return type with generic parameters substituted.
    pub returns: TypeRef,
    /// Set when trailing arguments are packed into a variadic array: the
    /// position of the first packed argument and the element type.
    pub spread: Option<(usize, TypeRef)>,
    pub cost: Cost,
}

#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum OverloadError {
    #[display("no overload of `{name}` accepts ({})", render_types(args))]
    NoMatch {
        name: String,
        args: Vec<TypeRef>,
        candidates: Vec<Signature>,
    },
    #[display("ambiguous call to `{name}`: candidates {}", render_signatures(candidates))]
    Ambiguous {
        name: String,
        candidates: Vec<Signature>,
    },
}

fn render_types(types: &[TypeRef]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_signatures(signatures: &[Signature]) -> String {
    signatures
        .iter()
        .map(|sig| format!("`{sig}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct OverloadResolver<'a> {
    classes: &'a ClassTable,
}

impl<'a> OverloadResolver<'a> {
    pub fn new(classes: &'a ClassTable) -> Self {
        Self { classes }
    }

    /// Pick the overload of `candidates` that best fits `args`.
    pub fn resolve(&self, candidates: &[&Signature], args: &[TypeRef]) -> Result<Resolved, OverloadError> {
        let name = candidates
            .first()
            .map(|sig| sig.name.clone())
            .unwrap_or_default();

        let fixed: Vec<Resolved> = candidates
            .iter()
            .enumerate()
            .filter_map(|(index, sig)| self.fixed_arity(index, sig, args))
            .collect();
        let applicable = if fixed.is_empty() {
            candidates
                .iter()
                .enumerate()
                .filter_map(|(index, sig)| self.expanded(index, sig, args))
                .collect()
        } else {
            fixed
        };

        if applicable.is_empty() {
            return Err(OverloadError::NoMatch {
                name,
                args: args.to_vec(),
                candidates: candidates.iter().map(|sig| (*sig).clone()).collect(),
            });
        }
        self.select(name, candidates, applicable)
    }

    fn fixed_arity(&self, index: usize, sig: &Signature, args: &[TypeRef]) -> Option<Resolved> {
        if sig.params.len() != args.len() {
            return None;
        }
        self.instantiate(index, sig, sig.params.clone(), args, None)
    }

    fn expanded(&self, index: usize, sig: &Signature, args: &[TypeRef]) -> Option<Resolved> {
        let element = sig.variadic_element()?;
        let fixed = sig.fixed_arity();
        if args.len() < fixed {
            return None;
        }
        let mut params = sig.params[..fixed].to_vec();
        params.extend(std::iter::repeat_n(element.clone(), args.len() - fixed));
        self.instantiate(index, sig, params, args, Some((fixed, element.clone())))
    }

    fn instantiate(
        &self,
        index: usize,
        sig: &Signature,
        params: Vec<TypeRef>,
        args: &[TypeRef],
        spread: Option<(usize, TypeRef)>,
    ) -> Option<Resolved> {
        let mut bindings = BTreeMap::new();
        for (param, arg) in params.iter().zip(args) {
            self.infer(param, arg, &mut bindings);
        }
        let bind = |ty: &TypeRef| default_vars(&ty.substitute(&bindings));

        let params: Vec<TypeRef> = params.iter().map(bind).collect();
        let mut cost = Cost::default();
        let mut coercions = Vec::with_capacity(args.len());
        for (param, arg) in params.iter().zip(args) {
            let coercion = self.classes.coerce(arg, param)?;
            cost.exact += usize::from(coercion.exact);
            cost.widening += coercion.widenings();
            cost.boxing += coercion.boxings();
            coercions.push(coercion.conversions);
        }
        Some(Resolved {
            index,
            params,
            coercions,
            returns: bind(&sig.returns),
            spread: spread.map(|(at, element)| (at, bind(&element))),
            cost,
        })
    }

    /// Bind a signature's own type variables from an argument type.
    fn infer(&self, param: &TypeRef, arg: &TypeRef, bindings: &mut BTreeMap<String, TypeRef>) {
        match param {
            TypeRef::Var(name) => {
                if !arg.is_null() && !arg.is_void() {
                    bindings.entry(name.clone()).or_insert_with(|| arg.boxed());
                }
            }
            TypeRef::Array(elem) => {
                if let TypeRef::Array(arg_elem) = arg {
                    self.infer(elem, arg_elem, bindings);
                }
            }
            TypeRef::Class { name, args } if !args.is_empty() && param.contains_var() => {
                let Some(view) = self.classes.as_super(&arg.boxed(), name) else {
                    return;
                };
                for (formal, actual) in args.iter().zip(view.type_args()) {
                    match formal {
                        TypeArg::Exact(f) | TypeArg::Extends(f) | TypeArg::Super(f) => {
                            self.infer(f, &actual.upper_bound(), bindings);
                        }
                        TypeArg::Any => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn select(
        &self,
        name: String,
        candidates: &[&Signature],
        mut applicable: Vec<Resolved>,
    ) -> Result<Resolved, OverloadError> {
        let best_exact = applicable.iter().map(|r| r.cost.exact).max().unwrap_or(0);
        applicable.retain(|r| r.cost.exact == best_exact);

        let costs: Vec<Cost> = applicable.iter().map(|r| r.cost).collect();
        applicable.retain(|r| !costs.iter().any(|other| other.dominates(&r.cost)));

        let ambiguous = |tied: &[Resolved]| OverloadError::Ambiguous {
            name: name.clone(),
            candidates: tied.iter().map(|r| candidates[r.index].clone()).collect(),
        };

        if applicable.iter().any(|r| r.cost != applicable[0].cost) {
            return Err(ambiguous(&applicable));
        }
        if applicable.len() == 1 {
            return Ok(applicable.remove(0));
        }

        let most_specific: Vec<usize> = (0..applicable.len())
            .filter(|&i| {
                (0..applicable.len())
                    .all(|j| i == j || self.more_specific(&applicable[i], &applicable[j]))
            })
            .collect();
        match most_specific.as_slice() {
            [winner] => Ok(applicable.swap_remove(*winner)),
            _ => Err(ambiguous(&applicable)),
        }
    }

    fn more_specific(&self, a: &Resolved, b: &Resolved) -> bool {
        let narrower = |x: &TypeRef, y: &TypeRef| {
            self.classes
                .coerce(x, y)
                .is_some_and(|coercion| coercion.boxings() == 0)
        };
        let params = a.params.iter().zip(&b.params).all(|(x, y)| narrower(x, y));
        let tails = match (&a.spread, &b.spread) {
            (Some((_, x)), Some((_, y))) => narrower(x, y),
            _ => true,
        };
        params && tails
    }
}

/// Replace type variables left unbound by inference with `Object`.
fn default_vars(ty: &TypeRef) -> TypeRef {
    match ty {
        TypeRef::Var(_) => TypeRef::object(),
        TypeRef::Class { name, args } => TypeRef::Class {
            name: name.clone(),
            args: args
                .iter()
                .map(|arg| match arg {
                    TypeArg::Exact(t) => TypeArg::Exact(default_vars(t)),
                    TypeArg::Extends(t) => TypeArg::Extends(default_vars(t)),
                    TypeArg::Super(t) => TypeArg::Super(default_vars(t)),
                    TypeArg::Any => TypeArg::Any,
                })
                .collect(),
        },
        TypeRef::Array(elem) => TypeRef::array(default_vars(elem)),
        other => other.clone(),
    }
}
