//! Translation of source types into target type-annotation terms.
//!
//! Nominal types resolve through a memo table that inserts an explicit
//! in-progress placeholder before recursing, so self- and mutually
//! referential declarations terminate: a recursive occurrence inside
//! its own definition translates to `any()`, and every later reference
//! reuses the cached named entry.

use std::collections::BTreeMap;

use vela_beam::{atom_name, BeamType, TypeSpec};
use vela_types::names;
use vela_types::{substitute_type_vars, CtorTag, Qualified, Type, TypeDecl, TypeEnv};

enum AliasEntry {
    InProgress,
    Done(BeamType),
}

pub(crate) struct TypeTranslator<'a> {
    env: &'a TypeEnv,
    table: BTreeMap<Qualified, AliasEntry>,
    specs: Vec<TypeSpec>,
}

impl<'a> TypeTranslator<'a> {
    pub(crate) fn new(env: &'a TypeEnv) -> Self {
        Self {
            env,
            table: BTreeMap::new(),
            specs: Vec::new(),
        }
    }

    /// The named type-spec declarations synthesized so far, in
    /// resolution order.
    pub(crate) fn into_specs(self) -> Vec<TypeSpec> {
        self.specs
    }

    pub(crate) fn translate(&mut self, ty: &Type) -> BeamType {
        match ty {
            Type::ForAll(_, body) => self.translate(body),
            // A constraint arrow is a dictionary parameter; the
            // dictionary itself has no useful annotation.
            Type::Constrained(_, body) => {
                BeamType::fun(vec![BeamType::Any], self.translate(body))
            }
            Type::Fun(from, to) => {
                BeamType::fun(vec![self.translate(from)], self.translate(to))
            }
            Type::Var(v) => BeamType::Var(v.clone()),
            Type::Record(fields, tail) => {
                let mut entries: Vec<(BeamType, BeamType)> = fields
                    .iter()
                    .map(|(label, value)| {
                        (
                            BeamType::Atom(Some(atom_name(label.as_str()))),
                            self.translate(value),
                        )
                    })
                    .collect();
                if tail.is_some() {
                    entries.push((BeamType::Any, BeamType::Any));
                }
                BeamType::Map(entries)
            }
            Type::Con(_) | Type::App(..) => {
                let (head, args) = ty.unapply();
                let Type::Con(q) = head else {
                    return BeamType::Any;
                };
                self.translate_con(q, &args)
            }
        }
    }

    fn translate_con(&mut self, q: &Qualified, args: &[&Type]) -> BeamType {
        if args.is_empty() {
            if names::is_prim(q, "Int") {
                return BeamType::Integer;
            }
            if names::is_prim(q, "Float") {
                return BeamType::Float;
            }
            if names::is_prim(q, "Bool") {
                return BeamType::Boolean;
            }
            if names::is_prim(q, "Text") {
                return BeamType::Binary;
            }
            if names::is_prim(q, "Char") {
                return BeamType::Char;
            }
        }
        if args.len() == 1 && names::is_prim(q, "Array") {
            return BeamType::Remote(
                "array".to_string(),
                "array".to_string(),
                vec![self.translate(args[0])],
            );
        }
        if args.len() == 1 && names::is_list(q) {
            return BeamType::list(self.translate(args[0]));
        }
        if args.len() == 2 && names::is_map(q) {
            return BeamType::Map(vec![(self.translate(args[0]), self.translate(args[1]))]);
        }
        // An effectful value is a nullary fun at runtime.
        if args.len() == 1 && names::is_effect(q) {
            return BeamType::fun(vec![], self.translate(args[0]));
        }
        // Immediately under a recognized uncurried wrapper the currying
        // is flattened into one n-ary fun spec.
        if let Some((_, n)) = names::uncurried_family(q) {
            if args.len() == n + 1 {
                let params = args[..n].iter().map(|a| self.translate(a)).collect();
                return BeamType::fun(params, self.translate(args[n]));
            }
            return BeamType::Any;
        }
        self.resolve_nominal(q, args)
    }

    fn resolve_nominal(&mut self, q: &Qualified, args: &[&Type]) -> BeamType {
        if let Some(entry) = self.table.get(q) {
            return match entry {
                // The explicit placeholder recursive lookups observe.
                AliasEntry::InProgress => BeamType::Any,
                AliasEntry::Done(cached) => cached.clone(),
            };
        }
        let Some(decl) = self.env.lookup_decl(q) else {
            return BeamType::Any;
        };
        let decl = decl.clone();
        let params = match &decl {
            TypeDecl::Synonym { params, .. } | TypeDecl::Data { params, .. } => params.clone(),
        };
        if args.len() != params.len() {
            // Partially applied constructors have no spec-level shape.
            return BeamType::Any;
        }
        let subst: BTreeMap<String, Type> = params
            .into_iter()
            .zip(args.iter().map(|a| (*a).clone()))
            .collect();

        self.table.insert(q.clone(), AliasEntry::InProgress);
        let resolved = match &decl {
            TypeDecl::Synonym { body, .. } => {
                self.translate(&substitute_type_vars(body, &subst))
            }
            TypeDecl::Data { ctors, tag, .. } => {
                if *tag == CtorTag::Newtype && ctors.len() == 1 && ctors[0].1.len() == 1 {
                    // Newtype wrappers are erased down to the field.
                    self.translate(&substitute_type_vars(&ctors[0].1[0], &subst))
                } else {
                    let mut variants: Vec<BeamType> = ctors
                        .iter()
                        .map(|(ctor_name, fields)| {
                            let mut elems = vec![BeamType::Atom(Some(atom_name(ctor_name)))];
                            elems.extend(
                                fields
                                    .iter()
                                    .map(|f| self.translate(&substitute_type_vars(f, &subst))),
                            );
                            BeamType::Tuple(elems)
                        })
                        .collect();
                    if variants.len() == 1 {
                        variants.pop().expect("single variant")
                    } else {
                        BeamType::Union(variants)
                    }
                }
            }
        };

        let name = atom_name(&q.name);
        self.specs.push(TypeSpec {
            name: name.clone(),
            ty: resolved,
        });
        let reference = BeamType::Alias(name);
        self.table
            .insert(q.clone(), AliasEntry::Done(reference.clone()));
        reference
    }
}

/// The second pass over emitted top-level specs: target spec syntax has
/// no parametric polymorphism at the point specs are consumed, so every
/// remaining free type variable becomes `any()`.
pub(crate) fn erase_free_vars(ty: &BeamType) -> BeamType {
    match ty {
        BeamType::Var(_) => BeamType::Any,
        BeamType::Fun(args, ret) => BeamType::Fun(
            args.iter().map(erase_free_vars).collect(),
            Box::new(erase_free_vars(ret)),
        ),
        BeamType::List(elem) => BeamType::List(Box::new(erase_free_vars(elem))),
        BeamType::Map(entries) => BeamType::Map(
            entries
                .iter()
                .map(|(k, v)| (erase_free_vars(k), erase_free_vars(v)))
                .collect(),
        ),
        BeamType::Tuple(elems) => BeamType::Tuple(elems.iter().map(erase_free_vars).collect()),
        BeamType::Union(variants) => {
            BeamType::Union(variants.iter().map(erase_free_vars).collect())
        }
        BeamType::Remote(module, name, args) => BeamType::Remote(
            module.clone(),
            name.clone(),
            args.iter().map(erase_free_vars).collect(),
        ),
        other => other.clone(),
    }
}
