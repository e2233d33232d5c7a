use std::collections::HashMap;

use tracing::debug;

use crate::node::Value;
use crate::rules::Semantic;
use crate::symbol::{ApproxTerminal, Boundary, EntityTerminal, RegexTerminal, Symbol};
use crate::utils::{Error, Result};

/// How a registered entity list is compiled into a terminal
#[derive(Debug, Clone)]
pub struct EntityOptions {
  pub case_insensitive: bool,
  pub boundary: Boundary,
  /// turns one piece of an entity into regex source
  pub escape: fn(&str) -> String,
}

impl Default for EntityOptions {
  fn default() -> Self {
    Self {
      case_insensitive: false,
      boundary: Boundary::None,
      escape: escape_special_chars,
    }
  }
}

#[derive(Debug)]
struct EntityDef {
  list: Vec<String>,
  terminal: RegexTerminal,
}

/// Entity lexicons, approx terminals and named semantic actions. Filled in
/// before grammars are built and only read afterwards.
#[derive(Debug)]
pub struct Registry {
  entities: HashMap<String, EntityDef>,
  approx: HashMap<String, ApproxTerminal>,
  actions: HashMap<String, Semantic>,
}

impl Default for Registry {
  fn default() -> Self {
    let mut registry = Self::empty();
    registry.register_builtin_actions();
    registry
  }
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry without the built-in actions
  pub fn empty() -> Self {
    Self {
      entities: HashMap::new(),
      approx: HashMap::new(),
      actions: HashMap::new(),
    }
  }

  pub fn register_entity<I, S>(&mut self, name: &str, list: I, options: EntityOptions) -> Result<()>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let list = list.into_iter().map(Into::into).collect::<Vec<String>>();
    let pattern = entities_to_pattern(&list, options.escape);
    debug!("registering entity {} ({} items): /{}/", name, list.len(), pattern);
    let terminal = RegexTerminal::with_options(&pattern, options.case_insensitive, options.boundary)?;
    self.entities.insert(name.to_string(), EntityDef { list, terminal });
    Ok(())
  }

  pub fn entity_list(&self, name: &str) -> Option<&[String]> {
    self.entities.get(name).map(|def| def.list.as_slice())
  }

  pub fn entity(&self, name: &str) -> Result<Symbol> {
    let def = self
      .entities
      .get(name)
      .ok_or_else(|| Error::UnregisteredEntity(name.to_string()))?;
    Ok(Symbol::Entity(EntityTerminal {
      name: name.to_string(),
      terminal: def.terminal.clone(),
    }))
  }

  pub fn register_approx<F>(&mut self, name: &str, max_gap: usize, only_firsts: bool, predicate: F)
  where
    F: Fn(&str, usize, usize) -> bool + 'static,
  {
    self.approx.insert(
      name.to_string(),
      ApproxTerminal::new(name, max_gap, only_firsts, predicate),
    );
  }

  pub fn approx(&self, name: &str) -> Result<Symbol> {
    self
      .approx
      .get(name)
      .cloned()
      .map(Symbol::Approx)
      .ok_or_else(|| Error::UnregisteredApprox(name.to_string()))
  }

  /// Registers an action under `name`, which also becomes its identity in
  /// rule display
  pub fn register_action(&mut self, name: &str, semantic: Semantic) {
    self.actions.insert(name.to_string(), semantic.named(name));
  }

  pub fn action(&self, name: &str) -> Result<Semantic> {
    self
      .actions
      .get(name)
      .cloned()
      .ok_or_else(|| Error::UnknownAction(name.to_string()))
  }

  fn register_builtin_actions(&mut self) {
    self.register_action(
      "concat",
      Semantic::new(|_, args| Value::Text(args.iter().map(Value::to_string).collect())),
    );
    self.register_action(
      "join",
      Semantic::new(|_, args| {
        Value::Text(
          args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" "),
        )
      }),
    );
    self.register_action("list", Semantic::new(|_, args| Value::List(args.to_vec())));
    self.register_action(
      "number",
      Semantic::new(|_, args| {
        args
          .first()
          .and_then(Value::as_f64)
          .map_or(Value::Null, Value::Number)
      }),
    );
    self.register_action("null", Semantic::new(|_, _| Value::Null));
    self.register_action(
      "first",
      Semantic::new(|_, args| args.first().cloned().unwrap_or(Value::Null)),
    );
    self.register_action(
      "last",
      Semantic::new(|_, args| args.last().cloned().unwrap_or(Value::Null)),
    );
  }
}

/// Escapes regex metacharacters, lets a dash float between up to four
/// whitespace chars on either side, and widens runs of spaces to 1-4
/// whitespace chars
pub fn escape_special_chars(s: &str) -> String {
  regex_static!(SPECIAL, r"[\-\[\]/\{\}\(\)\*\+\?\.\\\^\$\|]");
  regex_static!(DASH, r"\s*\\-\s*");
  regex_static!(SPACES, r" +");

  let escaped = SPECIAL.replace_all(s, r"\$0");
  let dashed = DASH.replace_all(&escaped, r"\s{0,4}\-\s{0,4}");
  SPACES.replace_all(&dashed, r"\s{1,4}").into_owned()
}

/// Groups `entities` by first char, keeping first-seen order and dropping
/// duplicate remainders. A group for the empty string sorts last so that
/// longer entities are preferred.
fn group_by_first<S: AsRef<str>>(entities: &[S]) -> Vec<(String, Vec<String>)> {
  let mut groups: Vec<(String, Vec<String>)> = Vec::new();
  for entity in entities {
    let entity = entity.as_ref();
    let split = entity.chars().next().map_or(0, char::len_utf8);
    let (head, rest) = entity.split_at(split);
    match groups.iter_mut().find(|(h, _)| h == head) {
      Some((_, rests)) => {
        if !rests.iter().any(|r| r == rest) {
          rests.push(rest.to_string());
        }
      }
      None => groups.push((head.to_string(), vec![rest.to_string()])),
    }
  }
  groups.sort_by_key(|(head, _)| head.is_empty());
  groups
}

/// Compiles an entity list into one regex source string by folding common
/// prefixes into a trie:
///
/// `["Newport", "New York", "New Orleans"]` gives
/// `N(?:e(?:w(?:port|\s{1,4}(?:York|Orleans))))`
pub fn entities_to_pattern<S: AsRef<str>>(entities: &[S], escape: fn(&str) -> String) -> String {
  group_by_first(entities)
    .into_iter()
    .map(|(head, rests)| {
      let inner = match rests.as_slice() {
        [] => String::new(),
        [single] => escape(single),
        _ => format!("(?:{})", entities_to_pattern(&rests, escape)),
      };
      format!("{}{}", escape(&head), inner)
    })
    .collect::<Vec<_>>()
    .join("|")
}
