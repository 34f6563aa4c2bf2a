//! Arity-generated predicate-factory convenience methods.
//!
//! `Program::declare_table` already accepts any arity up to
//! [`crate::value::MAX_ARITY`] via `Vec<ColumnSpec>`, but writing out each
//! column as `ColumnSpec::new(name, ty, mode)` is verbose at call sites that
//! know their arity at compile time. `ted_predicate_arity!` generates one
//! `Program::predicate_N` method per arity `N` from a single template
//! instead of eight hand-written near-duplicates, taking an `N`-tuple of
//! `(&str, DataType, IndexMode)` column descriptions directly.
///
/// Rust has no return-type/array-length overloading, so the eight
/// generated methods are distinctly named (`predicate_1` .. `predicate_8`)
/// rather than eight overloads of a single `predicate` name.
macro_rules! ted_predicate_arity {
    ($( $method:ident => $n:literal ),+ $(,)?) => {
        impl crate::program::Program {
            $(
                #[doc = concat!(
                    "Declare a ", stringify!($n), "-column table predicate from column tuples, ",
                    "equivalent to calling `declare_table` with a ", stringify!($n), "-element `Vec<ColumnSpec>`."
                )]
                pub fn $method(
                    &mut self,
                    name: impl Into<std::sync::Arc<str>>,
                    columns: [(&str, crate::value::DataType, crate::predicate::IndexMode); $n],
                    unique: bool,
                ) -> Result<crate::program::TablePredicateHandle, crate::error::TedError> {
                    let columns = columns
                        .into_iter()
                        .map(|(name, data_type, index)| crate::predicate::ColumnSpec::new(name, data_type, index))
                        .collect();
                    self.declare_table(name, columns, unique)
                }
            )+
        }
    };
}

ted_predicate_arity! {
    predicate_1 => 1,
    predicate_2 => 2,
    predicate_3 => 3,
    predicate_4 => 4,
    predicate_5 => 5,
    predicate_6 => 6,
    predicate_7 => 7,
    predicate_8 => 8,
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::predicate::IndexMode;
    use crate::program::Program;
    use crate::value::{DataType, Value};

    #[test]
    fn predicate_2_matches_hand_built_declare_table() {
        let mut p = Program::new(EngineConfig::default());
        let edge = p
            .predicate_2("edge", [("from", DataType::Sym, IndexMode::NonKey), ("to", DataType::Sym, IndexMode::None)], false)
            .unwrap();
        p.add_row(&edge, vec![Value::Sym("a".into()), Value::Sym("b".into())]).unwrap();
        assert_eq!(p.rows(&edge).len(), 1);
    }

    #[test]
    fn predicate_1_declares_a_unary_table() {
        let mut p = Program::new(EngineConfig::default());
        let fact = p.predicate_1("fact", [("value", DataType::Int, IndexMode::Key)], true).unwrap();
        assert_eq!(fact.arity(), 1);
    }
}
