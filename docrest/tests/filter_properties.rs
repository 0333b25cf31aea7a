use docrest::prelude::*;
use proptest::prelude::*;

const OPERATORS: [Operator; 7] = [
    Operator::exact().negatable(),
    Operator::ne().negatable(),
    Operator::lt().negatable(),
    Operator::lte().negatable(),
    Operator::gt().negatable(),
    Operator::gte().negatable(),
    Operator::is_in().negatable(),
];

fn users() -> ResourceSpec {
    let schema = DocumentSchema::builder("User", "users")
        .scalar("nick", ScalarType::String)
        .scalar("age", ScalarType::Int)
        .build();

    ResourceSpec::builder("users", schema)
        .rename("age", "years")
        .filter("nick", OPERATORS)
        .filter("years", OPERATORS)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn compiled_term_matches_direct_operator_call(
        operator in 0..OPERATORS.len(),
        on_years in any::<bool>(),
        negate in any::<bool>(),
        raw in "[a-z0-9]{1,8}",
    ) {
        let operator = OPERATORS[operator];
        let (public, storage, scalar) = if on_years {
            ("years", "age", ScalarType::Int)
        } else {
            ("nick", "nick", ScalarType::String)
        };
        let key = if negate {
            format!("{public}__not__{}", operator.name())
        } else {
            format!("{public}__{}", operator.name())
        };

        let params: Params = [(key, raw.clone())].into_iter().collect();
        let compiled = users().compile_filters(&params).unwrap();

        let expected = operator.apply(storage, &FilterValue::new(Some(raw), scalar), negate);
        prop_assert_eq!(compiled, Expr::always().and(expected));
    }
}
