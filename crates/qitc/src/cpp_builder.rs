use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use crate::builder::{Builder, DeclKey, DeclarationSet};
use crate::error::Result;
use crate::function::{Function, FunctionBody};
use crate::generator::{Generator, TypeIterator};
use crate::product::{Product, ProductGenerator, ProductIterator};
use crate::target::{RunArgs, Target};
use crate::types::Type;
use crate::value::Value;

const PREAMBLE: &str = r#"#include <cstddef>
#include <cstdio>
#include <cstdlib>
#include <random>
#include <vector>

static FILE *qit_report_file = NULL;
static FILE *qit_output_file = NULL;
static std::mt19937 qit_rng(std::random_device{}());

static void qit_report(const char *tag, const char *args) {
  if (qit_report_file == NULL) {
    return;
  }
  std::fprintf(qit_report_file, "%s %s\n", tag, args);
}

static void qit_write(FILE *f, int v) {
  std::fwrite(&v, sizeof v, 1, f);
}
"#;

/// Emits a self-contained C++11 program for a [`Target`].
pub struct CppBuilder {
    source_dir: PathBuf,
    args: RunArgs,
    declared: DeclarationSet<DeclKey>,
    product_names: HashMap<String, String>,
    used_names: HashSet<String>,
    generator_names: HashMap<Generator, String>,
    iterator_names: HashMap<TypeIterator, String>,
    includes: BTreeSet<PathBuf>,
    next_id: usize,
    out: String,
    indent: usize,
}

impl CppBuilder {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            args: RunArgs::new(),
            declared: DeclarationSet::new(),
            product_names: HashMap::new(),
            used_names: ["main".to_string()].into_iter().collect(),
            generator_names: HashMap::new(),
            iterator_names: HashMap::new(),
            includes: BTreeSet::new(),
            next_id: 0,
            out: String::new(),
            indent: 0,
        }
    }

    /// Full program source: declarations, external function sources, and a
    /// `main` writing one value of the target to the output pipe.
    pub fn build_collect(&mut self, target: &Target, args: &RunArgs) -> Result<String> {
        target.check_args(args)?;
        self.args = args.clone();
        target.declare(self);

        let element = self.element_type(&target.element_type());
        let handle = match target {
            Target::Generator(g) => self.make_generator(g),
            Target::Iterator(i) => self.make_iterator(i),
        };

        let mut src = String::with_capacity(PREAMBLE.len() + self.out.len() + 1024);
        src.push_str(PREAMBLE);
        src.push('\n');
        src.push_str(&self.out);
        for path in &self.includes {
            let path = escape_c_string(&path.display().to_string());
            src.push_str(&format!("#include \"{path}\"\n"));
        }
        if !self.includes.is_empty() {
            src.push('\n');
        }
        src.push_str(&main_function(target, &element, &handle));
        log::debug!(
            "generated {} bytes of C++ for a {} target",
            src.len(),
            element
        );
        Ok(src)
    }

    fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn open(&mut self, s: &str) {
        self.line(s);
        self.indent += 1;
    }

    fn close(&mut self, s: &str) {
        self.indent -= 1;
        self.line(s);
    }

    fn fresh_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn class_name_for_product(&mut self, product: &Product) -> String {
        let base = match product.name() {
            Some(name) => name.to_string(),
            None => format!("qit_Product{}", self.fresh_id()),
        };
        let mut name = base.clone();
        let mut n = 1;
        while self.used_names.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        self.used_names.insert(name.clone());
        name
    }

    fn name_generator(&mut self, generator: Generator) -> String {
        let name = format!("qit_gen{}", self.fresh_id());
        self.generator_names.insert(generator, name.clone());
        name
    }

    fn name_iterator(&mut self, iterator: TypeIterator) -> String {
        let name = format!("qit_iter{}", self.fresh_id());
        self.iterator_names.insert(iterator, name.clone());
        name
    }

    /// Typed expression for a value: `int` literal or aggregate initializer.
    fn value_expr(&mut self, ty: &Type, value: &Value) -> String {
        match value {
            Value::Int(v) => int_literal(*v),
            Value::Tuple(_) => format!("{}{}", self.element_type(ty), brace_literal(value)),
        }
    }

    fn values_member(&mut self, ty: &Type, values: &[Value]) -> (String, String) {
        let element = self.element_type(ty);
        let items = values
            .iter()
            .map(brace_literal)
            .collect::<Vec<_>>()
            .join(", ");
        (element, items)
    }

    fn params_list(&mut self, function: &Function) -> String {
        let mut params = Vec::with_capacity(function.params().len());
        for (name, ty) in function.params() {
            let element = self.element_type(ty);
            params.push(format!("const {element} &{name}"));
        }
        params.join(", ")
    }
}

impl Builder for CppBuilder {
    fn declare_product_class(&mut self, product: &Product) {
        if !self.declared.first_visit(&DeclKey::product_class(product)) {
            return;
        }
        let name = self.class_name_for_product(product);
        let fields = product
            .items()
            .iter()
            .map(|(field, ty)| (field.clone(), self.element_type(ty)))
            .collect::<Vec<_>>();
        self.product_names.insert(product.signature(), name.clone());

        self.open(&format!("struct {name} {{"));
        for (field, element) in &fields {
            self.line(&format!("{element} {field};"));
        }
        self.close("};");
        self.line("");
        self.open(&format!("static void qit_write(FILE *f, const {name} &v) {{"));
        if fields.is_empty() {
            self.line("(void)f;");
            self.line("(void)v;");
        }
        for (field, _) in &fields {
            self.line(&format!("qit_write(f, v.{field});"));
        }
        self.close("}");
        self.line("");
    }

    fn declare_product_generator(&mut self, generator: &ProductGenerator) {
        let key = Generator::Product(generator.clone());
        if !self.declared.first_visit(&DeclKey::Generator(key.clone())) {
            return;
        }
        let element = self.element_type(&Type::Product(generator.output_type().clone()));
        let members = generator
            .generators()
            .iter()
            .map(|g| self.make_generator(g))
            .collect::<Vec<_>>();
        let fields = generator
            .output_type()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let name = self.name_generator(key);

        self.open(&format!("struct {name} {{"));
        for (i, member) in members.iter().enumerate() {
            self.line(&format!("{member} f{i};"));
        }
        self.open(&format!("void generate({element} &out) {{"));
        if members.is_empty() {
            self.line("(void)out;");
        }
        for (i, field) in fields.iter().enumerate() {
            self.line(&format!("f{i}.generate(out.{field});"));
        }
        self.close("}");
        self.close("};");
        self.line("");
    }

    fn declare_product_iterator(&mut self, iterator: &ProductIterator) {
        let key = TypeIterator::Product(iterator.clone());
        if !self.declared.first_visit(&DeclKey::Iterator(key.clone())) {
            return;
        }
        let element = self.element_type(&Type::Product(iterator.output_type().clone()));
        let members = iterator
            .iterators()
            .iter()
            .map(|i| self.make_iterator(i))
            .collect::<Vec<_>>();
        let fields = iterator
            .output_type()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let name = self.name_iterator(key);

        self.open(&format!("struct {name} {{"));
        for (i, member) in members.iter().enumerate() {
            self.line(&format!("{member} f{i};"));
        }
        self.line(&format!("{element} current;"));
        self.line("bool started;");
        self.line("bool finished;");

        self.open("void reset() {");
        for i in 0..members.len() {
            self.line(&format!("f{i}.reset();"));
        }
        self.line("started = false;");
        self.line("finished = false;");
        self.close("}");

        self.open(&format!("bool next({element} &out) {{"));
        self.open("if (finished) {");
        self.line("return false;");
        self.close("}");
        self.open("if (!started) {");
        self.line("started = true;");
        for (i, field) in fields.iter().enumerate() {
            self.open(&format!("if (!f{i}.next(current.{field})) {{"));
            self.line("finished = true;");
            self.line("return false;");
            self.close("}");
        }
        self.line("out = current;");
        self.line("return true;");
        self.close("}");
        // Odometer: advance the rightmost field that still has values and
        // restart every field after it.
        for i in (0..fields.len()).rev() {
            self.open(&format!("if (f{i}.next(current.{})) {{", fields[i]));
            for (j, field) in fields.iter().enumerate().skip(i + 1) {
                self.line(&format!("f{j}.reset();"));
                self.open(&format!("if (!f{j}.next(current.{field})) {{"));
                self.line("finished = true;");
                self.line("return false;");
                self.close("}");
            }
            self.line("out = current;");
            self.line("return true;");
            self.close("}");
        }
        self.line("finished = true;");
        self.line("return false;");
        self.close("}");
        self.close("};");
        self.line("");
    }

    fn declare_generator(&mut self, generator: &Generator) {
        if let Generator::Product(g) = generator {
            self.declare_product_generator(g);
            return;
        }
        if !self.declared.first_visit(&DeclKey::Generator(generator.clone())) {
            return;
        }
        let element = self.element_type(&generator.output_type());
        match generator {
            Generator::UniformInt { min, max } => {
                let name = self.name_generator(generator.clone());
                self.open(&format!("struct {name} {{"));
                self.line(&format!(
                    "std::uniform_int_distribution<int> dist{{{}, {}}};",
                    int_literal(*min),
                    int_literal(*max)
                ));
                self.open("void generate(int &out) {");
                self.line("out = dist(qit_rng);");
                self.close("}");
                self.close("};");
            }
            Generator::Values(values) => {
                let (element, items) = self.values_member(values.ty(), values.values());
                let count = values.values().len();
                let name = self.name_generator(generator.clone());
                self.open(&format!("struct {name} {{"));
                self.line(&format!("std::vector<{element}> values;"));
                self.line("std::uniform_int_distribution<std::size_t> pick;");
                self.line(&format!(
                    "{name}() : values{{{items}}}, pick(0, {}) {{}}",
                    count - 1
                ));
                self.open(&format!("void generate({element} &out) {{"));
                self.line("out = values[pick(qit_rng)];");
                self.close("}");
                self.close("};");
            }
            Generator::Function(call) => {
                let members = call
                    .args()
                    .iter()
                    .map(|arg| self.make_generator(arg))
                    .collect::<Vec<_>>();
                let arg_types = call
                    .function()
                    .params()
                    .iter()
                    .map(|(_, ty)| self.element_type(ty))
                    .collect::<Vec<_>>();
                let name = self.name_generator(generator.clone());
                self.open(&format!("struct {name} {{"));
                for (i, member) in members.iter().enumerate() {
                    self.line(&format!("{member} a{i};"));
                }
                self.open(&format!("void generate({element} &out) {{"));
                for (i, ty) in arg_types.iter().enumerate() {
                    self.line(&format!("{ty} v{i} = {ty}();"));
                    self.line(&format!("a{i}.generate(v{i});"));
                }
                let call_args = (0..arg_types.len())
                    .map(|i| format!("v{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.line(&format!("out = {}({call_args});", call.function().name()));
                self.close("}");
                self.close("};");
            }
            Generator::Variable(variable) => {
                let expr = match self.args.get(variable.name()).cloned() {
                    Some(value) => self.value_expr(variable.ty(), &value),
                    None => format!("{element}()"),
                };
                let name = self.name_generator(generator.clone());
                self.open(&format!("struct {name} {{"));
                self.open(&format!("void generate({element} &out) {{"));
                self.line(&format!("out = {expr};"));
                self.close("}");
                self.close("};");
            }
            Generator::Product(_) => {}
        }
        self.line("");
    }

    fn declare_iterator(&mut self, iterator: &TypeIterator) {
        if let TypeIterator::Product(i) = iterator {
            self.declare_product_iterator(i);
            return;
        }
        if !self.declared.first_visit(&DeclKey::Iterator(iterator.clone())) {
            return;
        }
        let element = self.element_type(&iterator.output_type());
        match iterator {
            TypeIterator::Range(range) => {
                let name = self.name_iterator(iterator.clone());
                self.open(&format!("struct {name} {{"));
                self.line("long long current;");
                self.open("void reset() {");
                self.line(&format!("current = {};", int_literal(range.start())));
                self.close("}");
                self.open("bool next(int &out) {");
                self.open(&format!("if (current >= {}) {{", int_literal(range.end())));
                self.line("return false;");
                self.close("}");
                self.line("out = (int)current;");
                self.line("current += 1;");
                self.line("return true;");
                self.close("}");
                self.close("};");
            }
            TypeIterator::Values(values) => {
                let (element, items) = self.values_member(values.ty(), values.values());
                let name = self.name_iterator(iterator.clone());
                self.open(&format!("struct {name} {{"));
                self.line(&format!("std::vector<{element}> values;"));
                self.line("std::size_t pos;");
                self.line(&format!("{name}() : values{{{items}}}, pos(0) {{}}"));
                self.open("void reset() {");
                self.line("pos = 0;");
                self.close("}");
                self.open(&format!("bool next({element} &out) {{"));
                self.open("if (pos >= values.size()) {");
                self.line("return false;");
                self.close("}");
                self.line("out = values[pos];");
                self.line("pos += 1;");
                self.line("return true;");
                self.close("}");
                self.close("};");
            }
            TypeIterator::Generator(inner) => {
                let member = self.make_generator(inner.generator());
                let name = self.name_iterator(iterator.clone());
                self.open(&format!("struct {name} {{"));
                self.line(&format!("{member} gen;"));
                self.line("bool done;");
                self.open("void reset() {");
                self.line("done = false;");
                self.close("}");
                self.open(&format!("bool next({element} &out) {{"));
                self.open("if (done) {");
                self.line("return false;");
                self.close("}");
                self.line("gen.generate(out);");
                self.line("done = true;");
                self.line("return true;");
                self.close("}");
                self.close("};");
            }
            TypeIterator::Product(_) => {}
        }
        self.line("");
    }

    fn declare_function(&mut self, function: &Function) {
        if !self.declared.first_visit(&DeclKey::Function(function.clone())) {
            return;
        }
        let declaration = self.function_declaration(function);
        match function.body() {
            FunctionBody::Inline(body) => {
                self.open(&format!("{declaration} {{"));
                for line in body.lines() {
                    self.line(line);
                }
                self.close("}");
            }
            FunctionBody::External { .. } => {
                self.line(&format!("{declaration};"));
                if let Some(path) = function.source_path(&self.source_dir) {
                    self.includes.insert(path);
                }
            }
        }
        self.line("");
    }

    fn make_generator(&mut self, generator: &Generator) -> String {
        if let Some(name) = self.generator_names.get(generator) {
            return name.clone();
        }
        generator.declare(self);
        self.generator_names
            .get(generator)
            .cloned()
            .unwrap_or_default()
    }

    fn make_iterator(&mut self, iterator: &TypeIterator) -> String {
        if let Some(name) = self.iterator_names.get(iterator) {
            return name.clone();
        }
        iterator.declare(self);
        self.iterator_names.get(iterator).cloned().unwrap_or_default()
    }

    fn element_type(&mut self, ty: &Type) -> String {
        let signature = ty.signature();
        if let Type::Product(product) = ty.basic_type() {
            if !self.product_names.contains_key(&signature) {
                product.declare(self);
            }
            return self
                .product_names
                .get(&signature)
                .cloned()
                .unwrap_or_default();
        }
        "int".to_string()
    }

    fn function_declaration(&mut self, function: &Function) -> String {
        let ret = self.element_type(function.return_type());
        let params = self.params_list(function);
        format!("{ret} {}({params})", function.name())
    }
}

fn main_function(target: &Target, element: &str, handle: &str) -> String {
    let mut src = String::new();
    src.push_str("int main(int argc, char **argv) {\n");
    src.push_str("  if (argc != 3) {\n");
    src.push_str("    std::fprintf(stderr, \"usage: %s REPORT_PIPE OUTPUT_PIPE\\n\", argv[0]);\n");
    src.push_str("    return 2;\n");
    src.push_str("  }\n");
    src.push_str("  qit_report_file = std::fopen(argv[1], \"w\");\n");
    src.push_str("  if (qit_report_file == NULL) {\n");
    src.push_str("    std::perror(argv[1]);\n");
    src.push_str("    return 3;\n");
    src.push_str("  }\n");
    src.push_str("  std::setvbuf(qit_report_file, NULL, _IOLBF, BUFSIZ);\n");
    src.push_str("  qit_output_file = std::fopen(argv[2], \"wb\");\n");
    src.push_str("  if (qit_output_file == NULL) {\n");
    src.push_str("    std::perror(argv[2]);\n");
    src.push_str("    return 3;\n");
    src.push_str("  }\n");
    src.push_str(&format!("  static {handle} target;\n"));
    src.push_str(&format!("  {element} value = {element}();\n"));
    match target {
        Target::Generator(_) => {
            src.push_str("  target.generate(value);\n");
            src.push_str("  qit_write(qit_output_file, value);\n");
        }
        Target::Iterator(_) => {
            src.push_str("  target.reset();\n");
            src.push_str("  if (target.next(value)) {\n");
            src.push_str("    qit_write(qit_output_file, value);\n");
            src.push_str("  }\n");
        }
    }
    src.push_str("  std::fclose(qit_output_file);\n");
    src.push_str("  std::fclose(qit_report_file);\n");
    src.push_str("  return 0;\n");
    src.push_str("}\n");
    src
}

/// `i32::MIN` has no direct literal in C++.
pub fn int_literal(v: i32) -> String {
    if v == i32::MIN {
        "(-2147483647 - 1)".to_string()
    } else {
        v.to_string()
    }
}

fn brace_literal(value: &Value) -> String {
    match value {
        Value::Int(v) => int_literal(*v),
        Value::Tuple(items) => {
            let inner = items
                .iter()
                .map(brace_literal)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{inner}}}")
        }
    }
}

fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Field;
    use std::rc::Rc;

    fn point() -> Rc<Product> {
        Rc::new(
            Product::new(
                Some("Point"),
                [Field::named("x", Type::Int), Field::named("y", Type::Int)],
            )
            .unwrap(),
        )
    }

    #[test]
    fn int_min_is_spelled_as_expression() {
        assert_eq!(int_literal(i32::MIN), "(-2147483647 - 1)");
        assert_eq!(int_literal(-5), "-5");
    }

    #[test]
    fn shared_product_gets_one_struct() {
        let p = Type::Product(point());
        let pair = Product::tuple([p.clone(), p]);
        let target = Target::Generator(pair.generator());
        let src = CppBuilder::new("src")
            .build_collect(&target, &RunArgs::new())
            .unwrap();
        assert_eq!(src.matches("struct Point {").count(), 1);
        assert!(src.contains("Point _v0;"));
        assert!(src.contains("Point _v1;"));
    }

    #[test]
    fn iterator_target_writes_first_element_only() {
        let target = Target::Iterator(Type::range(0, 3).unwrap().iterator());
        let src = CppBuilder::new("src")
            .build_collect(&target, &RunArgs::new())
            .unwrap();
        assert!(src.contains("target.reset();"));
        assert!(src.contains("if (target.next(value)) {"));
        assert!(src.contains("current = 0;"));
        assert!(src.contains("if (current >= 3) {"));
    }

    #[test]
    fn variable_is_emitted_as_literal() {
        let var = crate::generator::Variable::new("seed", Type::Int)
            .unwrap()
            .generator();
        let target = Target::Generator(var);
        let mut args = RunArgs::new();
        args.insert("seed".to_string(), Value::Int(i32::MIN));
        let src = CppBuilder::new("src").build_collect(&target, &args).unwrap();
        assert!(src.contains("out = (-2147483647 - 1);"));
    }

    #[test]
    fn external_sources_are_included_before_main() {
        let f = Function::external("score", Type::Int, "score.cpp")
            .unwrap()
            .param("p", Type::Product(point()))
            .unwrap();
        let g = f.call(vec![point().generator()]).unwrap();
        let src = CppBuilder::new("/tmp/qit-src")
            .build_collect(&Target::Generator(g), &RunArgs::new())
            .unwrap();
        let include = src.find("#include \"/tmp/qit-src/score.cpp\"").unwrap();
        let main = src.find("int main(").unwrap();
        assert!(include < main);
        assert!(src.contains("int score(const Point &p);"));
    }
}
