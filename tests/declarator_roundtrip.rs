// Rendered declarators parse back to the type they were rendered from

use cheader::parse_header;
use cheader::parser::ast::{ArraySize, Param, Qualifiers, TypeExpr};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Modifier {
    Pointer,
    ConstPointer,
    Array(u64),
    Function { with_param: bool },
}

fn modifier() -> impl Strategy<Value = Modifier> {
    prop_oneof![
        Just(Modifier::Pointer),
        Just(Modifier::ConstPointer),
        (1u64..64).prop_map(Modifier::Array),
        any::<bool>().prop_map(|with_param| Modifier::Function { with_param }),
    ]
}

/// Wrap `int` in each modifier, innermost first, skipping combinations C
/// does not allow (arrays of functions, functions returning arrays or
/// functions).
fn build(modifiers: &[Modifier]) -> TypeExpr {
    let mut ty = TypeExpr::primitive("int");
    for modifier in modifiers {
        let returns_invalid = matches!(ty, TypeExpr::Function { .. } | TypeExpr::Array { .. });
        ty = match modifier {
            Modifier::Pointer => TypeExpr::pointer_to(ty),
            Modifier::ConstPointer => TypeExpr::qualified(
                Qualifiers {
                    is_const: true,
                    ..Qualifiers::default()
                },
                TypeExpr::pointer_to(ty),
            ),
            Modifier::Array(size) if !ty.is_function() => TypeExpr::Array {
                element: Box::new(ty),
                size: Some(ArraySize {
                    text: size.to_string(),
                    value: Some(*size),
                }),
            },
            Modifier::Function { with_param } if !returns_invalid => TypeExpr::Function {
                ret: Box::new(ty),
                params: if *with_param {
                    vec![Param {
                        name: None,
                        ty: TypeExpr::primitive("char"),
                    }]
                } else {
                    Vec::new()
                },
                variadic: false,
            },
            _ => ty,
        };
    }
    ty
}

proptest! {
    #[test]
    fn test_rendered_declarator_reparses(modifiers in prop::collection::vec(modifier(), 0..6)) {
        let ty = build(&modifiers);
        let source = format!("{};", ty.declarator("x"));

        let model = parse_header(&source);
        prop_assert!(model.diagnostics.is_empty(), "{}: {:?}", source, model.diagnostics);
        let declaration = model.declaration("x");
        prop_assert!(declaration.is_some(), "{} declared nothing", source);
        if let Some(declaration) = declaration {
            prop_assert_eq!(&declaration.ty, &ty, "{}", source);
        }
    }
}

#[test]
fn test_known_renderings() {
    let cases = [
        "int (*x)[3]",
        "int *x[3]",
        "int (*x)(char)",
        "int *(*x[4])()",
        "int * const (*x)[2]",
    ];
    for case in cases {
        let model = parse_header(&format!("{case};"));
        let declaration = model.declaration("x").unwrap();
        assert_eq!(declaration.ty.declarator("x"), case);
    }
}
