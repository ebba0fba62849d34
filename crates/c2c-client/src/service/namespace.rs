//! Namespace registry: constants, methods and broadcasts by path.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use c2c_core::{Value, ValueType};
use c2c_protocol::{MessageId, PeerId};

/// Errors raised while registering entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name is already used in this namespace.
    #[error("'{name}' is already registered in namespace '{namespace}'")]
    Duplicate { namespace: String, name: String },

    /// The parent namespace does not exist.
    #[error("no namespace at '{path}'")]
    UnknownNamespace { path: String },
}

/// Method implementation.
///
/// Receives validated positional arguments and returns the reply payload.
pub type MethodHandler = Box<dyn Fn(&[Value], &mut MethodContext) -> Value + Send + Sync>;

/// Positional argument of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub description: String,
    pub value_type: ValueType,
    /// Used when the caller omits this argument.
    pub default: Option<Value>,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            value_type,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn describe(&self) -> Value {
        let mut entries = vec![
            ("name", Value::string(&self.name)),
            ("description", Value::string(&self.description)),
            ("type", Value::string(self.value_type.as_str())),
        ];
        if let Some(ref default) = self.default {
            entries.push(("default", default.clone()));
        }
        Value::dict(entries)
    }
}

/// Checks `args` against `specs`, filling trailing defaults.
pub fn validate_args(specs: &[ArgSpec], args: &[Value]) -> Result<Vec<Value>, String> {
    if args.len() > specs.len() {
        return Err(format!(
            "too many arguments: expected at most {}, got {}",
            specs.len(),
            args.len()
        ));
    }

    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| match args.get(index) {
            Some(arg) if arg.value_type() == spec.value_type => Ok(arg.clone()),
            Some(arg) => Err(format!(
                "argument '{}' must be {}, got {}",
                spec.name,
                spec.value_type,
                arg.value_type()
            )),
            None => spec
                .default
                .clone()
                .ok_or_else(|| format!("missing argument '{}'", spec.name)),
        })
        .collect()
}

/// Per-call context handed to method handlers.
#[derive(Debug)]
pub struct MethodContext {
    caller: PeerId,
    emitted: Vec<(Vec<String>, Value)>,
}

impl MethodContext {
    pub fn new(caller: PeerId) -> Self {
        Self {
            caller,
            emitted: Vec::new(),
        }
    }

    /// Peer id of the calling client.
    pub fn caller(&self) -> PeerId {
        self.caller
    }

    /// Queues a broadcast emission.
    ///
    /// Emissions are delivered to subscribers before the method's reply.
    pub fn emit<I, S>(&mut self, path: I, value: Value)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emitted
            .push((path.into_iter().map(Into::into).collect(), value));
    }

    /// Drains the queued emissions.
    pub fn take_emitted(&mut self) -> Vec<(Vec<String>, Value)> {
        std::mem::take(&mut self.emitted)
    }
}

/// Handle to a registered namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceHandle {
    path: Vec<String>,
}

impl NamespaceHandle {
    /// The root namespace, which always exists.
    pub fn root() -> Self {
        Self { path: Vec::new() }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    fn child(&self, name: &str) -> Self {
        let mut path = self.path.clone();
        path.push(name.to_string());
        Self { path }
    }
}

impl fmt::Display for NamespaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.path.join("."))
        }
    }
}

struct Method {
    description: String,
    args: Vec<ArgSpec>,
    handler: MethodHandler,
}

impl Method {
    fn describe(&self) -> Value {
        Value::dict([
            ("description", Value::string(&self.description)),
            (
                "args",
                Value::List(self.args.iter().map(ArgSpec::describe).collect()),
            ),
        ])
    }
}

struct Broadcast {
    description: String,
    subscribers: Vec<MessageId>,
}

impl Broadcast {
    fn describe(&self) -> Value {
        Value::dict([("description", Value::string(&self.description))])
    }
}

#[derive(Default)]
struct Namespace {
    description: String,
    constants: BTreeMap<String, Value>,
    methods: BTreeMap<String, Method>,
    broadcasts: BTreeMap<String, Broadcast>,
    namespaces: BTreeMap<String, Namespace>,
}

impl Namespace {
    fn contains(&self, name: &str) -> bool {
        self.constants.contains_key(name)
            || self.methods.contains_key(name)
            || self.broadcasts.contains_key(name)
            || self.namespaces.contains_key(name)
    }

    fn describe(&self) -> Value {
        let mut entries = vec![("description", Value::string(&self.description))];
        if !self.constants.is_empty() {
            entries.push(("constants", Value::Dict(self.constants.clone())));
        }
        if !self.methods.is_empty() {
            entries.push(("methods", describe_all(&self.methods, Method::describe)));
        }
        if !self.broadcasts.is_empty() {
            entries.push(("broadcasts", describe_all(&self.broadcasts, Broadcast::describe)));
        }
        if !self.namespaces.is_empty() {
            entries.push((
                "namespaces",
                describe_all(&self.namespaces, |ns| Value::string(&ns.description)),
            ));
        }
        Value::dict(entries)
    }
}

fn describe_all<T>(entries: &BTreeMap<String, T>, describe: impl Fn(&T) -> Value) -> Value {
    Value::Dict(
        entries
            .iter()
            .map(|(name, entry)| (name.clone(), describe(entry)))
            .collect(),
    )
}

/// Everything a service host exposes.
#[derive(Default)]
pub struct Registry {
    root: Namespace,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a namespace nested under `parent`.
    pub fn add_namespace(
        &mut self,
        parent: &NamespaceHandle,
        name: &str,
        description: &str,
    ) -> Result<NamespaceHandle, RegistryError> {
        let namespace = self.vacant(parent, name)?;
        namespace.namespaces.insert(
            name.to_string(),
            Namespace {
                description: description.to_string(),
                ..Default::default()
            },
        );
        Ok(parent.child(name))
    }

    /// Adds a constant to `namespace`.
    pub fn add_constant(
        &mut self,
        namespace: &NamespaceHandle,
        name: &str,
        value: Value,
    ) -> Result<(), RegistryError> {
        self.vacant(namespace, name)?
            .constants
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Adds a method to `namespace`.
    pub fn add_method<F>(
        &mut self,
        namespace: &NamespaceHandle,
        name: &str,
        description: &str,
        args: Vec<ArgSpec>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[Value], &mut MethodContext) -> Value + Send + Sync + 'static,
    {
        self.vacant(namespace, name)?.methods.insert(
            name.to_string(),
            Method {
                description: description.to_string(),
                args,
                handler: Box::new(handler),
            },
        );
        Ok(())
    }

    /// Adds a broadcast to `parent`.
    pub fn add_broadcast(
        &mut self,
        parent: &NamespaceHandle,
        name: &str,
        description: &str,
    ) -> Result<(), RegistryError> {
        self.vacant(parent, name)?.broadcasts.insert(
            name.to_string(),
            Broadcast {
                description: description.to_string(),
                subscribers: Vec::new(),
            },
        );
        Ok(())
    }

    /// Describes the entry at `path` as a tree of values.
    pub fn introspect(&self, path: &[String]) -> Value {
        let Some((name, parent)) = path.split_last() else {
            return self.root.describe();
        };
        let Some(namespace) = self.namespace(parent) else {
            return unknown_path(path);
        };

        if let Some(child) = namespace.namespaces.get(name) {
            child.describe()
        } else if let Some(method) = namespace.methods.get(name) {
            method.describe()
        } else if let Some(broadcast) = namespace.broadcasts.get(name) {
            broadcast.describe()
        } else if let Some(constant) = namespace.constants.get(name) {
            constant.clone()
        } else {
            unknown_path(path)
        }
    }

    /// Validates `args` and runs the method at `path`.
    ///
    /// Unknown methods and invalid arguments yield `Value::Error` without
    /// running any handler.
    pub fn call(&self, path: &[String], args: &[Value], ctx: &mut MethodContext) -> Value {
        let Some(method) = self.method(path) else {
            return Value::error(format!("no method at '{}'", path.join(".")));
        };
        match validate_args(&method.args, args) {
            Ok(args) => (method.handler)(&args, ctx),
            Err(message) => Value::error(message),
        }
    }

    /// Returns true if `path` names a broadcast.
    pub fn has_broadcast(&self, path: &[String]) -> bool {
        self.broadcast(path).is_some()
    }

    /// Records a subscription message for the broadcast at `path`.
    pub fn subscribe(&mut self, path: &[String], subscription: MessageId) -> Result<(), String> {
        let broadcast = self
            .broadcast_mut(path)
            .ok_or_else(|| format!("no broadcast at '{}'", path.join(".")))?;
        broadcast.subscribers.push(subscription);
        Ok(())
    }

    /// Subscription messages of the broadcast at `path`, oldest first.
    pub fn subscribers(&self, path: &[String]) -> Vec<MessageId> {
        self.broadcast(path)
            .map(|broadcast| broadcast.subscribers.clone())
            .unwrap_or_default()
    }

    /// Forgets a subscription.
    pub fn unsubscribe(&mut self, path: &[String], subscription: MessageId) {
        if let Some(broadcast) = self.broadcast_mut(path) {
            broadcast.subscribers.retain(|id| *id != subscription);
        }
    }

    fn namespace(&self, path: &[String]) -> Option<&Namespace> {
        path.iter()
            .try_fold(&self.root, |namespace, name| namespace.namespaces.get(name))
    }

    fn namespace_mut(&mut self, path: &[String]) -> Option<&mut Namespace> {
        path.iter().try_fold(&mut self.root, |namespace, name| {
            namespace.namespaces.get_mut(name)
        })
    }

    fn method(&self, path: &[String]) -> Option<&Method> {
        let (name, parent) = path.split_last()?;
        self.namespace(parent)?.methods.get(name)
    }

    fn broadcast(&self, path: &[String]) -> Option<&Broadcast> {
        let (name, parent) = path.split_last()?;
        self.namespace(parent)?.broadcasts.get(name)
    }

    fn broadcast_mut(&mut self, path: &[String]) -> Option<&mut Broadcast> {
        let (name, parent) = path.split_last()?;
        self.namespace_mut(parent)?.broadcasts.get_mut(name)
    }

    /// Returns `parent` if `name` is still free in it.
    fn vacant(
        &mut self,
        parent: &NamespaceHandle,
        name: &str,
    ) -> Result<&mut Namespace, RegistryError> {
        let namespace =
            self.namespace_mut(parent.path())
                .ok_or_else(|| RegistryError::UnknownNamespace {
                    path: parent.to_string(),
                })?;
        if namespace.contains(name) {
            return Err(RegistryError::Duplicate {
                namespace: parent.to_string(),
                name: name.to_string(),
            });
        }
        Ok(namespace)
    }
}

fn unknown_path(path: &[String]) -> Value {
    Value::error(format!("nothing registered at '{}'", path.join(".")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn arithmetic() -> Registry {
        let mut registry = Registry::new();
        let ns = registry
            .add_namespace(&NamespaceHandle::root(), "Arithmetic", "A namespace for arithmetic methods.")
            .unwrap();
        registry.add_constant(&ns, "pi", Value::Int32(3)).unwrap();
        registry
            .add_method(
                &ns,
                "sum",
                "sum(op1, op2) -> op1 + op2",
                vec![
                    ArgSpec::new("op1", "the first operand", ValueType::Int32),
                    ArgSpec::new("op2", "the second operand", ValueType::Int32),
                ],
                |args, ctx| {
                    let sum = args[0].as_int32().unwrap_or(0) + args[1].as_int32().unwrap_or(0);
                    if sum % 2 != 0 {
                        ctx.emit(["odd sum"], Value::Int32(sum));
                    }
                    Value::Int32(sum)
                },
            )
            .unwrap();
        registry
            .add_broadcast(&NamespaceHandle::root(), "odd sum", "Odd sums.")
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = arithmetic();
        let ns = NamespaceHandle::root().child("Arithmetic");

        let err = registry.add_constant(&ns, "sum", Value::Int32(1)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                namespace: "Arithmetic".into(),
                name: "sum".into()
            }
        );
        assert!(registry
            .add_broadcast(&NamespaceHandle::root(), "Arithmetic", "clash")
            .is_err());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut registry = Registry::new();
        let ghost = NamespaceHandle::root().child("Ghost");
        let err = registry.add_constant(&ghost, "x", Value::Int32(1)).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownNamespace { .. }));
    }

    #[test]
    fn introspect_namespace() {
        let registry = arithmetic();
        let desc = registry.introspect(&path(&["Arithmetic"]));

        assert_eq!(
            desc.dict_get("description"),
            Some(&Value::string("A namespace for arithmetic methods."))
        );
        assert_eq!(
            desc.dict_get("constants").and_then(|c| c.dict_get("pi")),
            Some(&Value::Int32(3))
        );

        let args = desc
            .dict_get("methods")
            .and_then(|m| m.dict_get("sum"))
            .and_then(|s| s.dict_get("args"))
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].dict_get("name"), Some(&Value::string("op1")));
        assert_eq!(args[1].dict_get("name"), Some(&Value::string("op2")));
        assert!(args.iter().all(|a| a.dict_get("type") == Some(&Value::string("int32"))));
    }

    #[test]
    fn introspect_root_lists_broadcasts() {
        let registry = arithmetic();
        let root = registry.introspect(&[]);
        assert!(root.dict_get("broadcasts").and_then(|b| b.dict_get("odd sum")).is_some());
        assert!(root.dict_get("namespaces").and_then(|n| n.dict_get("Arithmetic")).is_some());
    }

    #[test]
    fn introspect_unknown_path() {
        let registry = arithmetic();
        assert!(registry.introspect(&path(&["Geometry"])).is_error());
        assert!(registry.introspect(&path(&["Geometry", "area"])).is_error());
    }

    #[test]
    fn call_runs_handler_and_collects_emissions() {
        let registry = arithmetic();
        let sum = path(&["Arithmetic", "sum"]);

        let mut ctx = MethodContext::new(PeerId(1));
        assert_eq!(
            registry.call(&sum, &[Value::Int32(3), Value::Int32(4)], &mut ctx),
            Value::Int32(7)
        );
        assert_eq!(ctx.take_emitted(), vec![(path(&["odd sum"]), Value::Int32(7))]);

        let mut ctx = MethodContext::new(PeerId(1));
        assert_eq!(
            registry.call(&sum, &[Value::Int32(4), Value::Int32(4)], &mut ctx),
            Value::Int32(8)
        );
        assert!(ctx.take_emitted().is_empty());
    }

    #[test]
    fn call_validates_arguments() {
        let registry = arithmetic();
        let sum = path(&["Arithmetic", "sum"]);
        let mut ctx = MethodContext::new(PeerId(1));

        assert!(registry.call(&sum, &[Value::Int32(3)], &mut ctx).is_error());
        assert!(registry
            .call(&sum, &[Value::Int32(3), Value::string("4")], &mut ctx)
            .is_error());
        assert!(registry
            .call(&path(&["Arithmetic", "product"]), &[], &mut ctx)
            .is_error());
        assert!(ctx.take_emitted().is_empty());
    }

    #[test]
    fn defaults_fill_trailing_arguments() {
        let specs = vec![
            ArgSpec::new("a", "", ValueType::Int32),
            ArgSpec::new("b", "", ValueType::Int32).with_default(Value::Int32(10)),
        ];
        assert_eq!(
            validate_args(&specs, &[Value::Int32(1)]),
            Ok(vec![Value::Int32(1), Value::Int32(10)])
        );
        assert!(validate_args(&specs, &[]).is_err());
        assert!(validate_args(&specs, &[Value::Int32(1), Value::Int32(2), Value::Int32(3)]).is_err());
    }

    #[test]
    fn subscriptions() {
        let mut registry = arithmetic();
        let odd = path(&["odd sum"]);

        assert!(registry.has_broadcast(&odd));
        registry.subscribe(&odd, MessageId(4)).unwrap();
        registry.subscribe(&odd, MessageId(9)).unwrap();
        assert_eq!(registry.subscribers(&odd), vec![MessageId(4), MessageId(9)]);

        registry.unsubscribe(&odd, MessageId(4));
        assert_eq!(registry.subscribers(&odd), vec![MessageId(9)]);

        assert!(registry.subscribe(&path(&["even sum"]), MessageId(1)).is_err());
    }
}
