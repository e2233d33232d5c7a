use chartwise::{
  EntityOptions, Grammar, NodeResult, Parser, ParserKind, Registry, Rule, Semantic, Symbol, Value,
};

const BOTH: [ParserKind; 2] = [ParserKind::TopDown, ParserKind::BottomUp];

fn parse(grammar: &Grammar, kind: ParserKind, input: &str) -> Vec<NodeResult> {
  let mut parser = Parser::new(grammar, kind);
  parser.parse(input).unwrap();
  parser.results(true).unwrap()
}

fn nt(name: &str) -> Symbol {
  Symbol::nonterminal(name)
}

fn num(args: &[Value], idx: usize) -> f64 {
  args.get(idx).and_then(Value::as_f64).unwrap_or(f64::NAN)
}

fn math_grammar() -> Grammar {
  let mut registry = Registry::new();
  let binary = |f: fn(f64, f64) -> f64| Semantic::new(move |_, args| Value::Number(f(num(args, 0), num(args, 2))));
  registry.register_action("add", binary(|a, b| a + b));
  registry.register_action("sub", binary(|a, b| a - b));
  registry.register_action("mul", binary(|a, b| a * b));
  registry.register_action("div", binary(|a, b| a / b));
  registry.register_action("pow", binary(f64::powf));
  registry.register_action("neg", Semantic::new(|_, args| Value::Number(-num(args, 1))));
  registry.register_action(
    "paren",
    Semantic::new(|_, args| args.get(1).cloned().unwrap_or(Value::Null)),
  );

  Grammar::load(
    r#"
S -> EXP {% first %} entity: true

EXP ->
  /\d+(?:\.\d+)?/ {% number %} ||
  # pm, md: plus-minus, multiply-divide
  EXP "+" EXP  left_assoc:pm opPrecedence:exp:10 {% add %} ||
  EXP "-" EXP  left_assoc:pm opPrecedence:exp:10 {% sub %} ||
  EXP "*" EXP  left_assoc:md opPrecedence:exp:20 {% mul %} ||
  EXP "/" EXP  left_assoc:md opPrecedence:exp:20 {% div %} ||
  "-" EXP      right_assoc:neg opPrecedence:exp:30 {% neg %} ||
  EXP "^" EXP  right_assoc:pow opPrecedence:exp:40 {% pow %} ||
  "(" EXP ")"  {% paren %}
"#,
    &registry,
  )
  .unwrap()
}

#[test]
fn test_math() {
  let g = math_grammar();
  let cases = [
    ("1 + (1)", 2.0),
    ("(1 + (1))", 2.0),
    ("-1", -1.0),
    ("-(-1)", 1.0),
    ("1 + 1", 2.0),
    ("1 + 2 + 3", 6.0),
    ("1 + 2 * 3 * 4", 25.0),
    ("2 + 2 * 3 / 4", 3.5),
    ("4 - 2 * 32 / 4 ^ 2", 0.0),
    ("2 ^ 2 ^ 3", 256.0),
    ("64 + 32 + -4 * 2 ^ 2 ^ 3 / 4 ^ 2", 32.0),
    ("64 + 32 + 4 * 2 ^ 2 ^ 3 / 4 ^ 2", 160.0),
    ("1.5 * 2", 3.0),
  ];
  for kind in BOTH {
    for (input, expected) in cases {
      let results = parse(&g, kind, input);
      assert_eq!(results.len(), 1, "{} {}", kind, input);
      assert_eq!(results[0].data, Value::Number(expected), "{} {}", kind, input);
    }
  }
}

#[test]
fn test_hello_world() {
  let mut registry = Registry::new();
  registry.register_action("lukas", Semantic::new(|_, _| Value::from("LUKAS")));
  registry.register_action(
    "colons",
    Semantic::new(|_, args| {
      Value::from(args.iter().map(Value::to_string).collect::<Vec<_>>().join(":"))
    }),
  );
  let g = Grammar::load(
    r#"
S -> "Hello" WORLD "!" "I am" NAME {% colons %} entity: true

WORLD -> "WORLD"

NAME -> FIRST

FIRST -> "Lukáš"  {% lukas %}
"#,
    &registry,
  )
  .unwrap();

  for kind in BOTH {
    for input in ["Hello WORLD! I am Lukáš", "Hello WORLD ! I am   Lukáš"] {
      let results = parse(&g, kind, input);
      assert_eq!(results.len(), 1, "{} {}", kind, input);
      assert_eq!(results[0].data, Value::from("Hello:WORLD:!:I am:LUKAS"));
    }
  }
}

#[test]
fn test_txt_of_built_rules() {
  let g = Grammar::new(vec![
    Rule::of(
      "S",
      vec![
        Symbol::literal("Hello"),
        Symbol::literal("my"),
        nt("WORLD"),
        Symbol::literal("!"),
        Symbol::literal("I am"),
        nt("NAME"),
      ],
    )
    .entity(),
    Rule::of("WORLD", vec![Symbol::literal("WORLD")]),
    Rule::of("NAME", vec![nt("FIRST")]),
    Rule::of("FIRST", vec![Symbol::literal("Lukáš")]),
  ]);
  for kind in BOTH {
    let results = parse(&g, kind, "Hello my WORLD! I am Lukáš");
    assert_eq!(results.len(), 1);
    assert_eq!(
      results[0].txt,
      r#"S("Hello", "my", WORLD("WORLD"), "!", "I am", NAME(FIRST("Lukáš")))"#
    );
  }
}

#[test]
fn test_priority() {
  let mut registry = Registry::new();
  registry.register_action(
    "pair",
    Semantic::new(|_, args| Value::from(format!("{}:{}", args[0], args[1]))),
  );
  registry.register_action("blank", Semantic::new(|_, _| Value::from("")));
  let g = Grammar::load(
    r#"
S -> RULE {% first %} entity: true priority: 15 ||
     "aabb" entity:true priority:14 ||
     "aabb" EMPTY {% pair %} entity:true

RULE ->  A ABB  {% pair %} priority: 10 ||
        AAB B  {% pair %} priority: 20 ||
        AA BB  {% pair %}

EMPTY -> {% blank %}

A -> "a"

ABB -> "abb"

AAB -> "aab"

B -> "b"

AA -> "aa"

BB -> "bb"
"#,
    &registry,
  )
  .unwrap();

  for kind in BOTH {
    let results = parse(&g, kind, "aabb");
    let found = results
      .iter()
      .map(|r| (r.data.to_string(), r.txt.as_str()))
      .collect::<Vec<_>>();
    assert_eq!(
      found,
      vec![
        ("aab:b".to_string(), r#"S(RULE(AAB("aab"), B("b")))"#),
        ("aa:bb".to_string(), r#"S(RULE(AA("aa"), BB("bb")))"#),
        ("aabb:".to_string(), r#"S("aabb", EMPTY())"#),
      ],
      "{}",
      kind
    );
  }
}

#[test]
fn test_priority_between_entities() {
  let g: Grammar = r#"
S -> X {% first %} entity: true priority: 10
S -> Y {% first %} entity: true priority: 20
X -> /\w+/
Y -> /\w+/ {% null %}
"#
  .parse()
  .unwrap();
  for kind in BOTH {
    let results = parse(&g, kind, "word");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, Value::Null);
  }
}

#[test]
fn test_empty_rules() {
  let g: Grammar = r#"
S -> EMPTY1 NESTED_EMPTY_B "aaa" {% last %} entity: true

EMPTY1 -> {% null %}

NESTED_EMPTY_B -> EMPTY2 "b"

EMPTY2 -> {% null %}
"#
  .parse()
  .unwrap();

  for kind in [ParserKind::TopDown, ParserKind::BottomUp, ParserKind::BottomUpApprox] {
    let results = parse(&g, kind, "b aaa");
    assert_eq!(results.len(), 1, "{}", kind);
    assert_eq!(results[0].data, Value::from("aaa"));
  }
}

#[test]
fn test_entities() {
  let mut registry = Registry::new();
  registry
    .register_entity("first", ["Jan", "Petr", "Pavel"], EntityOptions::default())
    .unwrap();
  registry
    .register_entity(
      "surname",
      ["Novák", "Svoboda", "Novotný", "Dvořák"],
      EntityOptions::default(),
    )
    .unwrap();
  registry.register_action(
    "first_surname",
    Semantic::new(|_, args| Value::from(format!("{} {}", args[0], args[1]))),
  );
  registry.register_action(
    "surname_first",
    Semantic::new(|_, args| Value::from(format!("{} {}", args[1], args[0]))),
  );
  let g = Grammar::load(
    r#"
S -> FIRST SURNAME {% first_surname %} entity: true

S -> SURNAME FIRST {% surname_first %} entity: true

FIRST -> EntityTerminal(first)

SURNAME -> EntityTerminal(surname)
"#,
    &registry,
  )
  .unwrap();

  let cases = [
    ("Jan Novák", "Jan Novák"),
    ("Novák Jan", "Jan Novák"),
    ("Petr Dvořák", "Petr Dvořák"),
    ("Novotný Pavel", "Pavel Novotný"),
  ];
  for kind in BOTH {
    for (input, expected) in cases {
      let results = parse(&g, kind, input);
      assert_eq!(results.len(), 1, "{} {}", kind, input);
      assert_eq!(results[0].data, Value::from(expected));
    }
  }
}

#[test]
fn test_approx_gap() {
  let mut registry = Registry::new();
  registry.register_approx("parcelIDGap", 100, true, |_, _, _| true);
  registry.register_action(
    "parcel",
    Semantic::new(|_, args| Value::from(format!("{}-{}-{}", args[1], args[2], args[3]))),
  );
  let g = Grammar::load(
    r#"
S -> PARCEL NUMBER ApproxTerminal(parcelIDGap) NUMBER {% parcel %} entity: true

PARCEL -> /parc\. ?id\./

NUMBER -> /\d+/
"#,
    &registry,
  )
  .unwrap();

  let results = parse(&g, ParserKind::BottomUpApprox, "parc. id. 10 xxx 20");
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].data, Value::from("10-xxx -20"));

  // without the approx pass the gap is never filled
  assert!(parse(&g, ParserKind::BottomUp, "parc. id. 10 xxx 20").is_empty());
}

#[test]
fn test_approx_predicate_rejects() {
  let mut registry = Registry::new();
  registry.register_approx("short", 100, true, |input, start, end| {
    !input[start..end].contains("stop")
  });
  let g = Grammar::load(
    r#"
S -> "id" ApproxTerminal(short) NUMBER entity: true
NUMBER -> /\d+/
"#,
    &registry,
  )
  .unwrap();
  assert_eq!(parse(&g, ParserKind::BottomUpApprox, "id go 12").len(), 1);
  assert!(parse(&g, ParserKind::BottomUpApprox, "id stop 12").is_empty());
}

#[test]
fn test_big_ambiguity() {
  const N: usize = 5;
  let mut rules = vec![
    Rule::of("S", vec![nt("A"), nt("A"), nt("A")])
      .action(|_, args| Value::Number(args.iter().filter_map(Value::as_f64).sum()))
      .entity(),
  ];
  for i in 1..=N {
    rules.push(Rule::of("A", vec![nt(&format!("A{}", i))]).action(|_, _| Value::Number(1.0)));
    rules.push(Rule::of(&format!("B{}", i), vec![Symbol::literal("x")]).action(|_, _| Value::Number(1.0)));
    for j in 1..=N {
      rules.push(
        Rule::of(&format!("A{}", i), vec![nt(&format!("B{}", j))])
          .action(|_, args| Value::Number(num(args, 0) + 1.0)),
      );
    }
  }
  let g = Grammar::new(rules);

  for kind in BOTH {
    let mut parser = Parser::new(&g, kind);
    parser.parse("x x x").unwrap();
    let results = parser.results(true).unwrap();
    assert_eq!(results.len(), (N * N).pow(3), "{}", kind);
    assert_eq!(results[0].data, Value::Number(3.0));

    // one edge per derivation identity, however many derivations it packs
    let full = parser
      .chart()
      .edges()
      .filter(|(_, e)| e.lhs() == "S" && e.is_reduced())
      .count();
    assert_eq!(full, 1);
  }
}

#[test]
fn test_long_unit_chain() {
  const N: usize = 1000;
  let mut rules = vec![
    Rule::of("S", vec![nt("A1"), nt("B1")])
      .action(|_, args| Value::Number(num(args, 0) + num(args, 1)))
      .entity(),
  ];
  for i in 1..N {
    for x in ["A", "B"] {
      rules.push(
        Rule::of(&format!("{}{}", x, i), vec![nt(&format!("{}{}", x, i + 1))])
          .action(|_, args| Value::Number(num(args, 0) + 1.0)),
      );
    }
  }
  rules.push(Rule::of(&format!("A{}", N), vec![Symbol::literal("a")]).action(|_, _| Value::Number(1.0)));
  rules.push(Rule::of(&format!("B{}", N), vec![Symbol::literal("b")]).action(|_, _| Value::Number(1.0)));
  let g = Grammar::new(rules);

  for kind in BOTH {
    let results = parse(&g, kind, "a b");
    assert_eq!(results.len(), 1, "{}", kind);
    assert_eq!(results[0].data, Value::Number((N * 2) as f64));
  }
}

fn count_grammar() -> Grammar {
  Grammar::new(vec![
    Rule::of("S", vec![nt("L")]).entity(),
    Rule::of("L", vec![nt("L"), Symbol::literal("a")]).action(|_, args| Value::Number(num(args, 0) + 1.0)),
    Rule::of("L", vec![Symbol::literal("a")]).action(|_, _| Value::Number(1.0)),
  ])
}

#[test]
fn test_deep_left_recursion() {
  let g = count_grammar();
  for (kind, n) in [(ParserKind::TopDown, 1500), (ParserKind::BottomUp, 200)] {
    let input = vec!["a"; n].join(" ");
    let results = parse(&g, kind, &input);
    assert_eq!(results.len(), 1, "{}", kind);
    assert_eq!(results[0].data, Value::Number(n as f64), "{}", kind);
  }
}

#[test]
fn test_adjacent_regex_matches() {
  let g: Grammar = r#"
S -> D D entity: true
D -> /\d/
"#
  .parse()
  .unwrap();
  for kind in [ParserKind::TopDown, ParserKind::BottomUp, ParserKind::BottomUpApprox] {
    let results = parse(&g, kind, "12");
    assert_eq!(results.len(), 1, "{}", kind);
    assert_eq!(results[0].txt, "S(D(\"1\"), D(\"2\"))");
  }
}

#[test]
fn test_regex_word_boundary_uses_preceding_text() {
  let g: Grammar = r#"
S -> "x" B entity: true
B -> /\bfoo/
"#
  .parse()
  .unwrap();
  for kind in [ParserKind::TopDown, ParserKind::BottomUp, ParserKind::BottomUpApprox] {
    assert!(parse(&g, kind, "xfoo").is_empty(), "{}", kind);
    assert_eq!(parse(&g, kind, "x foo").len(), 1, "{}", kind);
  }
}

#[test]
fn test_partial_results() {
  let g: Grammar = r#"
NAME -> "Jan" || "Petr" entity: true
"#
  .parse()
  .unwrap();
  let mut parser = Parser::new(&g, ParserKind::BottomUp);
  parser.parse("Jan and Petr").unwrap();
  assert!(parser.results(true).unwrap().is_empty());
  let partial = parser.results(false).unwrap();
  let found = partial.iter().map(|r| r.data.to_string()).collect::<Vec<_>>();
  assert_eq!(found, vec!["Petr"]);
}

#[test]
fn test_strategies_agree() {
  let g: Grammar = r#"
S -> NP VP entity: true
NP -> "I" || DET N || NP PP
VP -> V NP || VP PP
PP -> P NP
DET -> "a" || "the"
N -> "man" || "telescope" || "hill"
V -> "saw"
P -> "with" || "on"
"#
  .parse()
  .unwrap();

  let input = "I saw the man on the hill with a telescope";
  let mut by_kind = BOTH
    .iter()
    .map(|&kind| {
      let mut found = parse(&g, kind, input)
        .into_iter()
        .map(|r| (r.data.to_string(), r.txt))
        .collect::<Vec<_>>();
      found.sort();
      found
    })
    .collect::<Vec<_>>();
  let bottom_up = by_kind.pop().unwrap();
  let top_down = by_kind.pop().unwrap();
  assert_eq!(top_down.len(), 5);
  assert_eq!(top_down, bottom_up);
}
