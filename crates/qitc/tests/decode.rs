use std::rc::Rc;

use qitc::{Error, Field, Product, Target, Type, Value};

fn ints(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

fn point() -> Rc<Product> {
    Rc::new(
        Product::new(
            Some("Point"),
            [Field::named("x", Type::Int), Field::named("y", Type::Int)],
        )
        .expect("valid product"),
    )
}

#[test]
fn empty_product_reads_nothing() {
    let empty = Product::tuple(Vec::<Type>::new());
    let bytes = ints(&[7]);
    let mut r: &[u8] = &bytes;
    assert_eq!(
        empty.read(&mut r).expect("decode"),
        Some(Value::Tuple(vec![]))
    );
    assert_eq!(r.len(), 4);
}

#[test]
fn complete_product_decodes_in_field_order() {
    let bytes = ints(&[3, -4]);
    let mut r: &[u8] = &bytes;
    assert_eq!(
        point().read(&mut r).expect("decode"),
        Some(Value::Tuple(vec![Value::Int(3), Value::Int(-4)]))
    );
    assert_eq!(point().read(&mut r).expect("decode"), None);
}

#[test]
fn product_cut_between_fields_is_incomplete() {
    let bytes = ints(&[3]);
    let mut r: &[u8] = &bytes;
    let err = point().read(&mut r).unwrap_err();
    assert!(matches!(
        err,
        Error::IncompleteProduct { read: 1, total: 2, .. }
    ));
}

#[test]
fn int_cut_inside_its_bytes_is_incomplete() {
    let mut bytes = ints(&[3]);
    bytes.extend_from_slice(&[1, 2]);
    let mut r: &[u8] = &bytes;
    let err = point().read(&mut r).unwrap_err();
    assert!(matches!(err, Error::IncompleteValue { expected: 4, got: 2 }));
}

#[test]
fn nested_products_decode_recursively() {
    let outer = Product::new(
        Some("Outer"),
        [
            Field::named("p", Type::Product(point())),
            Field::named("z", Type::range(0, 100).expect("range")),
        ],
    )
    .expect("valid product");

    let bytes = ints(&[1, 2, 3]);
    let mut r: &[u8] = &bytes;
    assert_eq!(
        outer.read(&mut r).expect("decode"),
        Some(Value::Tuple(vec![
            Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
            Value::Int(3),
        ]))
    );

    let bytes = ints(&[1]);
    let mut r: &[u8] = &bytes;
    assert!(matches!(
        outer.read(&mut r),
        Err(Error::IncompleteProduct { read: 1, total: 2, ref product }) if product == "Point"
    ));
}

#[test]
fn derived_types_decode_through_their_basic_product() {
    let derived = Type::from(point().derive());
    let bytes = ints(&[5, 6]);
    let mut r: &[u8] = &bytes;
    assert_eq!(
        derived.read(&mut r).expect("decode"),
        Some(Value::Tuple(vec![Value::Int(5), Value::Int(6)]))
    );
}

#[test]
fn targets_decode_their_element_type() {
    let target = Target::Iterator(Type::Product(point()).iterator());
    let bytes = ints(&[8, 9]);
    let mut r: &[u8] = &bytes;
    assert_eq!(
        target.read(&mut r).expect("decode"),
        Some(Value::Tuple(vec![Value::Int(8), Value::Int(9)]))
    );

    let empty: &[u8] = &[];
    let mut r = empty;
    assert_eq!(target.read(&mut r).expect("decode"), None);
}
