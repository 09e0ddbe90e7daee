use std::rc::Rc;

use qitc::{
    Builder, CppBuilder, DeclKey, DeclarationSet, Field, Function, Generator, Product,
    ProductGenerator, ProductIterator, RunArgs, Target, Type, TypeIterator,
};

/// Records declaration order, skipping nodes it has already seen.
#[derive(Default)]
struct Recorder {
    seen: DeclarationSet<DeclKey>,
    log: Vec<String>,
}

impl Recorder {
    fn record(&mut self, key: DeclKey, label: String) {
        if self.seen.first_visit(&key) {
            self.log.push(label);
        }
    }

    fn position(&self, label: &str) -> usize {
        self.log
            .iter()
            .position(|l| l == label)
            .unwrap_or_else(|| panic!("{label} was never declared: {:?}", self.log))
    }

    fn count(&self, label: &str) -> usize {
        self.log.iter().filter(|l| *l == label).count()
    }
}

fn generator_label(g: &Generator) -> String {
    match g {
        Generator::UniformInt { min, max } => format!("uniform[{min},{max}]"),
        Generator::Values(_) => "values".to_string(),
        Generator::Product(p) => format!("pgen:{}", p.output_type().label_for_tests()),
        Generator::Function(f) => format!("call:{}", f.function().name()),
        Generator::Variable(v) => format!("var:{}", v.name()),
    }
}

trait TestLabel {
    fn label_for_tests(&self) -> String;
}

impl TestLabel for Product {
    fn label_for_tests(&self) -> String {
        self.name().unwrap_or("anon").to_string()
    }
}

impl Builder for Recorder {
    fn declare_product_class(&mut self, product: &Product) {
        self.record(
            DeclKey::product_class(product),
            format!("class:{}", product.label_for_tests()),
        );
    }

    fn declare_product_generator(&mut self, generator: &ProductGenerator) {
        let g = Generator::Product(generator.clone());
        let label = generator_label(&g);
        self.record(DeclKey::Generator(g), label);
    }

    fn declare_product_iterator(&mut self, iterator: &ProductIterator) {
        self.record(
            DeclKey::Iterator(TypeIterator::Product(iterator.clone())),
            format!("piter:{}", iterator.output_type().label_for_tests()),
        );
    }

    fn declare_generator(&mut self, generator: &Generator) {
        self.record(DeclKey::Generator(generator.clone()), generator_label(generator));
    }

    fn declare_iterator(&mut self, iterator: &TypeIterator) {
        let label = match iterator {
            TypeIterator::Range(r) => format!("range[{},{})", r.start(), r.end()),
            TypeIterator::Values(_) => "values-iter".to_string(),
            TypeIterator::Product(p) => format!("piter:{}", p.output_type().label_for_tests()),
            TypeIterator::Generator(g) => format!("once:{}", generator_label(g.generator())),
        };
        self.record(DeclKey::Iterator(iterator.clone()), label);
    }

    fn declare_function(&mut self, function: &Function) {
        self.record(
            DeclKey::Function(function.clone()),
            format!("fn:{}", function.name()),
        );
    }

    fn make_generator(&mut self, generator: &Generator) -> String {
        generator_label(generator)
    }

    fn make_iterator(&mut self, _iterator: &TypeIterator) -> String {
        "iter".to_string()
    }

    fn element_type(&mut self, ty: &Type) -> String {
        ty.signature()
    }

    fn function_declaration(&mut self, function: &Function) -> String {
        function.name().to_string()
    }
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

fn segment() -> Product {
    Product::new(
        Some("Segment"),
        [
            Field::named("a", Type::Product(point())),
            Field::named("b", Type::Product(point())),
        ],
    )
    .expect("valid product")
}

#[test]
fn dependencies_are_declared_first() {
    let mut rec = Recorder::default();
    segment().generator().declare(&mut rec);

    let full = format!("uniform[{},{}]", i32::MIN, i32::MAX);
    assert!(rec.position(&full) < rec.position("pgen:Point"));
    assert!(rec.position("class:Point") < rec.position("pgen:Point"));
    assert!(rec.position("pgen:Point") < rec.position("class:Segment"));
    assert!(rec.position("class:Segment") < rec.position("pgen:Segment"));
}

#[test]
fn shared_sub_nodes_are_declared_once() {
    let mut rec = Recorder::default();
    let seg = segment();
    seg.generator().declare(&mut rec);
    seg.iterator().declare(&mut rec);

    assert_eq!(rec.count("class:Point"), 1);
    assert_eq!(rec.count("pgen:Point"), 1);
    assert_eq!(rec.count("piter:Point"), 1);
    assert_eq!(rec.count("class:Segment"), 1);
}

#[test]
fn generator_iterator_declares_its_generator_first() {
    let mut rec = Recorder::default();
    Type::Int.iterator().declare(&mut rec);
    let gen = format!("uniform[{},{}]", i32::MIN, i32::MAX);
    assert_eq!(rec.log, vec![gen.clone(), format!("once:{gen}")]);
}

#[test]
fn function_calls_declare_args_then_function() {
    let f = Function::external("score", Type::Int, "score.cpp")
        .expect("function")
        .param("p", Type::Product(point()))
        .expect("param");
    let call = f.call(vec![point().generator()]).expect("call");

    let mut rec = Recorder::default();
    call.declare(&mut rec);
    assert!(rec.position("pgen:Point") < rec.position("fn:score"));
    assert!(rec.position("fn:score") < rec.position("call:score"));
}

#[test]
fn declaration_set_reports_first_visit_once() {
    let mut set = DeclarationSet::new();
    let key = DeclKey::product_class(&point());
    assert!(set.first_visit(&key));
    assert!(!set.first_visit(&key));
    assert!(set.contains(&key));
    assert_eq!(set.len(), 1);
}

#[test]
fn cpp_function_declarations_use_const_references() {
    let add = Function::inline("add", Type::Int, "return a.x + b;")
        .expect("function")
        .param("a", Type::Product(point()))
        .expect("param")
        .param("b", Type::range(0, 3).expect("range"))
        .expect("param");
    let mut builder = CppBuilder::new("src");
    assert_eq!(
        builder.function_declaration(&add),
        "int add(const Point &a, const int &b)"
    );
}

#[test]
fn cpp_product_iterator_walks_like_an_odometer() {
    let target = Target::Iterator(segment().iterator());
    let src = CppBuilder::new("src")
        .build_collect(&target, &RunArgs::new())
        .expect("source");
    assert_eq!(src.matches("struct Segment {").count(), 1);
    assert_eq!(src.matches("struct Point {").count(), 1);
    assert!(src.contains("if (f1.next(current.b)) {"));
    assert!(src.contains("f1.reset();"));
    assert!(src.contains("static void qit_write(FILE *f, const Segment &v) {"));
}

#[test]
fn unbound_variables_fail_before_emission() {
    let var = qitc::Variable::new("n", Type::Int).expect("variable").generator();
    let err = CppBuilder::new("src")
        .build_collect(&Target::Generator(var), &RunArgs::new())
        .unwrap_err();
    assert!(matches!(err, qitc::Error::UnboundVariable { ref name } if name == "n"));
}
