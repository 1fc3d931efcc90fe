//! Validator module - static checks on submitted source
//!
//! A deny-list evaluated over the tree-sitter syntax tree of the submission.
//! It cheaply rejects obviously dangerous submissions before any process is
//! spawned. It is not a security boundary: obfuscated code can get past it,
//! and the isolation backends are what actually contain the program.
//!
//! The validator does NOT:
//! - Execute or import anything from the submission
//! - Report where in the source a violation was found

use std::collections::HashMap;
use std::fmt;

use tree_sitter::{Node, Parser, Tree};

/// Policy category of a rejected submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    EmptySource,
    Unanalyzable,
    ProcessSpawning,
    NetworkAccess,
    FilesystemEscape,
    DynamicEvaluation,
    EnvironmentAccess,
    PrivilegeManipulation,
    LimitBypass,
}

impl Category {
    /// Human-readable rejection message returned to the caller
    pub fn reason(&self) -> &'static str {
        match self {
            Category::EmptySource => "No code was submitted",
            Category::Unanalyzable => "Code rejected: the source could not be analysed",
            Category::ProcessSpawning => {
                "Code rejected: process spawning and shell execution are not allowed"
            }
            Category::NetworkAccess => "Code rejected: network access is not allowed",
            Category::FilesystemEscape => {
                "Code rejected: modifying the filesystem outside the sandbox is not allowed"
            }
            Category::DynamicEvaluation => {
                "Code rejected: dynamic code evaluation and interpreter internals are not allowed"
            }
            Category::EnvironmentAccess => {
                "Code rejected: reading or changing environment variables is not allowed"
            }
            Category::PrivilegeManipulation => {
                "Code rejected: changing process privileges or signalling processes is not allowed"
            }
            Category::LimitBypass => {
                "Code rejected: changing resource limits or signal handlers is not allowed"
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::EmptySource => "empty_source",
            Category::Unanalyzable => "unanalyzable",
            Category::ProcessSpawning => "process_spawning",
            Category::NetworkAccess => "network_access",
            Category::FilesystemEscape => "filesystem_escape",
            Category::DynamicEvaluation => "dynamic_evaluation",
            Category::EnvironmentAccess => "environment_access",
            Category::PrivilegeManipulation => "privilege_manipulation",
            Category::LimitBypass => "limit_bypass",
        };
        write!(f, "{}", s)
    }
}

/// Result of validating one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied(Category),
}

impl Verdict {
    /// Rejection message, present iff the submission was denied
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Verdict::Allowed => None,
            Verdict::Denied(category) => Some(category.reason()),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allowed => write!(f, "allowed"),
            Verdict::Denied(category) => write!(f, "denied ({})", category),
        }
    }
}

/// Modules that may not be imported at all
const DENIED_MODULES: &[(&str, Category)] = &[
    ("subprocess", Category::ProcessSpawning),
    ("pty", Category::ProcessSpawning),
    ("posix", Category::ProcessSpawning),
    ("nt", Category::ProcessSpawning),
    ("commands", Category::ProcessSpawning),
    ("popen2", Category::ProcessSpawning),
    ("pexpect", Category::ProcessSpawning),
    ("multiprocessing", Category::ProcessSpawning),
    ("concurrent.futures.process", Category::ProcessSpawning),
    ("socket", Category::NetworkAccess),
    ("ssl", Category::NetworkAccess),
    ("socketserver", Category::NetworkAccess),
    ("urllib", Category::NetworkAccess),
    ("urllib2", Category::NetworkAccess),
    ("urllib3", Category::NetworkAccess),
    ("http", Category::NetworkAccess),
    ("httplib", Category::NetworkAccess),
    ("requests", Category::NetworkAccess),
    ("httpx", Category::NetworkAccess),
    ("aiohttp", Category::NetworkAccess),
    ("ftplib", Category::NetworkAccess),
    ("smtplib", Category::NetworkAccess),
    ("poplib", Category::NetworkAccess),
    ("imaplib", Category::NetworkAccess),
    ("telnetlib", Category::NetworkAccess),
    ("xmlrpc", Category::NetworkAccess),
    ("shutil", Category::FilesystemEscape),
    ("importlib", Category::DynamicEvaluation),
    ("builtins", Category::DynamicEvaluation),
    ("ctypes", Category::DynamicEvaluation),
    ("cffi", Category::DynamicEvaluation),
    ("marshal", Category::DynamicEvaluation),
    ("runpy", Category::DynamicEvaluation),
    ("code", Category::DynamicEvaluation),
    ("codeop", Category::DynamicEvaluation),
    ("resource", Category::LimitBypass),
    ("signal", Category::LimitBypass),
];

/// Attributes of otherwise allowed modules. `*` matches any run of characters.
const DENIED_ATTRS: &[(&str, &str, Category)] = &[
    ("os", "system", Category::ProcessSpawning),
    ("os", "popen", Category::ProcessSpawning),
    ("os", "fork", Category::ProcessSpawning),
    ("os", "forkpty", Category::ProcessSpawning),
    ("os", "exec*", Category::ProcessSpawning),
    ("os", "spawn*", Category::ProcessSpawning),
    ("os", "posix_spawn*", Category::ProcessSpawning),
    ("os", "startfile", Category::ProcessSpawning),
    ("os", "environ", Category::EnvironmentAccess),
    ("os", "environb", Category::EnvironmentAccess),
    ("os", "getenv", Category::EnvironmentAccess),
    ("os", "getenvb", Category::EnvironmentAccess),
    ("os", "putenv", Category::EnvironmentAccess),
    ("os", "unsetenv", Category::EnvironmentAccess),
    ("os", "remove", Category::FilesystemEscape),
    ("os", "unlink", Category::FilesystemEscape),
    ("os", "rmdir", Category::FilesystemEscape),
    ("os", "removedirs", Category::FilesystemEscape),
    ("os", "rename", Category::FilesystemEscape),
    ("os", "renames", Category::FilesystemEscape),
    ("os", "replace", Category::FilesystemEscape),
    ("os", "chdir", Category::FilesystemEscape),
    ("os", "fchdir", Category::FilesystemEscape),
    ("os", "chroot", Category::FilesystemEscape),
    ("os", "chmod", Category::FilesystemEscape),
    ("os", "chown", Category::FilesystemEscape),
    ("os", "lchown", Category::FilesystemEscape),
    ("os", "link", Category::FilesystemEscape),
    ("os", "symlink", Category::FilesystemEscape),
    ("os", "mkfifo", Category::FilesystemEscape),
    ("os", "mknod", Category::FilesystemEscape),
    ("os", "truncate", Category::FilesystemEscape),
    ("os", "set*id", Category::PrivilegeManipulation),
    ("os", "setgroups", Category::PrivilegeManipulation),
    ("os", "setsid", Category::PrivilegeManipulation),
    ("os", "setpgid", Category::PrivilegeManipulation),
    ("os", "kill", Category::PrivilegeManipulation),
    ("os", "killpg", Category::PrivilegeManipulation),
    ("os", "nice", Category::PrivilegeManipulation),
    ("os", "setpriority", Category::PrivilegeManipulation),
    ("sys", "modules", Category::DynamicEvaluation),
    ("concurrent.futures", "ProcessPoolExecutor", Category::ProcessSpawning),
    ("asyncio", "create_subprocess_exec", Category::ProcessSpawning),
    ("asyncio", "create_subprocess_shell", Category::ProcessSpawning),
    ("asyncio", "open_connection", Category::NetworkAccess),
    ("asyncio", "open_unix_connection", Category::NetworkAccess),
    ("asyncio", "start_server", Category::NetworkAccess),
    ("asyncio", "start_unix_server", Category::NetworkAccess),
];

/// Builtins that evaluate strings as code
const DENIED_BUILTINS: &[&str] = &["eval", "exec", "compile", "__import__"];

/// Interpreter internals used to climb out of restricted namespaces
const DENIED_DUNDERS: &[&str] = &[
    "__import__",
    "__builtins__",
    "__subclasses__",
    "__globals__",
    "__code__",
    "__loader__",
];

/// Builtins that reach attributes by (possibly computed) name
const REFLECTION_BUILTINS: &[&str] = &["getattr", "setattr", "delattr"];

/// Check a submission against the deny-list
pub fn validate(source: &str) -> Verdict {
    if source.trim().is_empty() {
        return Verdict::Denied(Category::EmptySource);
    }

    let Some(tree) = parse(source) else {
        return Verdict::Denied(Category::Unanalyzable);
    };
    match Scanner::new(source).scan(&tree) {
        Some(category) => Verdict::Denied(category),
        None => Verdict::Allowed,
    }
}

fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    parser.parse(source, None)
}

fn denied_module(path: &str) -> Option<Category> {
    DENIED_MODULES
        .iter()
        .find(|(name, _)| {
            path == *name
                || path
                    .strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
        .map(|(_, category)| *category)
}

fn attr_matches(pattern: &str, attr: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            attr.len() >= prefix.len() + suffix.len()
                && attr.starts_with(prefix)
                && attr.ends_with(suffix)
        }
        None => pattern == attr,
    }
}

fn denied_attr(module: &str, attr: &str) -> Option<Category> {
    DENIED_ATTRS
        .iter()
        .find(|(m, pattern, _)| *m == module && attr_matches(pattern, attr))
        .map(|(_, _, category)| *category)
}

/// Category for wholesale access to a module with denied attributes
/// (`from os import *`, `getattr(os, ...)`)
fn guarded_module(module: &str) -> Option<Category> {
    DENIED_ATTRS
        .iter()
        .find(|(m, _, _)| *m == module)
        .map(|(_, _, category)| *category)
}

/// How an identifier is used at its position in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Read as a value
    Reference,
    /// Introduces a name (def/class name, parameter, keyword argument)
    Binding,
}

struct Scanner<'s> {
    source: &'s str,
    /// Local name -> dotted module path it is bound to
    aliases: HashMap<&'s str, String>,
}

impl<'s> Scanner<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            aliases: HashMap::new(),
        }
    }

    fn text(&self, node: Node) -> &'s str {
        &self.source[node.byte_range()]
    }

    /// `a.b.c` as written in an import, ignoring whitespace around the dots
    fn dotted(&self, node: Node) -> String {
        if node.kind() == "identifier" {
            return self.text(node).to_string();
        }
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|child| child.kind() == "identifier")
            .map(|child| self.text(child))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Walk the tree in source order. Inside ERROR subtrees the rules are
    /// stricter because the surrounding structure is unknown.
    fn scan(&mut self, tree: &Tree) -> Option<Category> {
        let mut stack = vec![(tree.root_node(), Role::Reference, false)];

        while let Some((node, role, strict)) = stack.pop() {
            let strict = strict || node.is_error();
            let mut next: Vec<(Node, Role)> = Vec::new();

            match node.kind() {
                "import_statement" => {
                    if let Err(category) = self.import_statement(node) {
                        return Some(category);
                    }
                }
                "import_from_statement" => {
                    if let Err(category) = self.import_from_statement(node) {
                        return Some(category);
                    }
                }
                "exec_statement" => return Some(Category::DynamicEvaluation),
                "identifier" => {
                    if let Some(category) = self.identifier(node, role, strict) {
                        return Some(category);
                    }
                }
                "attribute" => {
                    if let Some(category) = self.attribute(node) {
                        return Some(category);
                    }
                    if let Some(object) = node.child_by_field_name("object") {
                        next.push((object, Role::Reference));
                    }
                }
                "call" => {
                    if let Some(category) = self.reflection(node) {
                        return Some(category);
                    }
                    next.extend(children(node, Role::Reference));
                }
                "function_definition" | "class_definition" | "keyword_argument"
                | "default_parameter" | "typed_default_parameter" => {
                    let name = node.child_by_field_name("name");
                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        let role = if Some(child) == name {
                            Role::Binding
                        } else {
                            Role::Reference
                        };
                        next.push((child, role));
                    }
                }
                "parameters" | "lambda_parameters" | "typed_parameter" => {
                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        let role = if child.kind() == "identifier" {
                            Role::Binding
                        } else {
                            Role::Reference
                        };
                        next.push((child, role));
                    }
                }
                _ => next.extend(children(node, Role::Reference)),
            }

            // reversed so the stack pops them in source order
            stack.extend(next.into_iter().rev().map(|(n, r)| (n, r, strict)));
        }
        None
    }

    fn identifier(&self, node: Node, role: Role, strict: bool) -> Option<Category> {
        let name = self.text(node);
        if DENIED_DUNDERS.contains(&name) {
            return Some(Category::DynamicEvaluation);
        }
        if strict {
            // no reliable structure: any mention of a denied name is enough
            if let Some(category) = denied_module(name) {
                return Some(category);
            }
            if DENIED_BUILTINS.contains(&name) {
                return Some(Category::DynamicEvaluation);
            }
        }
        if role == Role::Reference && DENIED_BUILTINS.contains(&name) {
            return Some(Category::DynamicEvaluation);
        }
        None
    }

    /// `import a.b [as c], d`
    fn import_statement(&mut self, node: Node) -> Result<(), Category> {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (path, local) = match name.kind() {
                "aliased_import" => {
                    let Some(target) = name.child_by_field_name("name") else {
                        continue;
                    };
                    let alias = name.child_by_field_name("alias").map(|a| self.text(a));
                    (self.dotted(target), alias)
                }
                _ => (self.dotted(name), None),
            };

            if let Some(category) = denied_module(&path) {
                return Err(category);
            }
            match local {
                Some(alias) => {
                    self.aliases.insert(alias, path);
                }
                None => {
                    if let Some(top_node) = first_identifier(name) {
                        let top = self.text(top_node);
                        self.aliases.insert(top, top.to_string());
                    }
                }
            }
        }
        Ok(())
    }

    /// `from a.b import c [as d], ...` and `from a import *`
    fn import_from_statement(&mut self, node: Node) -> Result<(), Category> {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return Ok(());
        };
        if module_node.kind() == "relative_import" {
            // local modules cannot exist in a single-file submission
            return Ok(());
        }
        let module = self.dotted(module_node);
        if let Some(category) = denied_module(&module) {
            return Err(category);
        }

        let mut cursor = node.walk();
        if node
            .children(&mut cursor)
            .any(|child| child.kind() == "wildcard_import")
        {
            return match guarded_module(&module) {
                Some(category) => Err(category),
                None => Ok(()),
            };
        }

        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (target, alias) = match name.kind() {
                "aliased_import" => (
                    name.child_by_field_name("name"),
                    name.child_by_field_name("alias"),
                ),
                _ => (Some(name), None),
            };
            let Some(target) = target else {
                continue;
            };
            let imported = self.dotted(target);

            if let Some(category) = denied_attr(&module, &imported) {
                return Err(category);
            }
            let path = format!("{}.{}", module, imported);
            if let Some(category) = denied_module(&path) {
                return Err(category);
            }

            let local = match alias {
                Some(alias) => self.text(alias),
                None => self.text(target),
            };
            self.aliases.insert(local, path);
        }
        Ok(())
    }

    /// `a.b.c` with the head resolved through import aliases
    fn attribute(&self, node: Node) -> Option<Category> {
        let attr = node.child_by_field_name("attribute")?;
        if DENIED_DUNDERS.contains(&self.text(attr)) {
            return Some(Category::DynamicEvaluation);
        }

        let mut segments = Vec::new();
        let mut current = node;
        loop {
            match current.kind() {
                "attribute" => {
                    segments.push(self.text(current.child_by_field_name("attribute")?));
                    current = current.child_by_field_name("object")?;
                }
                "identifier" => {
                    segments.push(self.text(current));
                    break;
                }
                _ => return None,
            }
        }
        segments.reverse();

        let head = segments[0];
        let imported = self.resolve(head);
        let mut resolved = imported.unwrap_or(head).to_string();
        for segment in &segments[1..] {
            resolved.push('.');
            resolved.push_str(segment);
        }

        let (module, name) = resolved.rsplit_once('.')?;
        if let Some(category) = denied_attr(module, name) {
            return Some(category);
        }
        // only names bound by an import refer to modules
        if imported.is_some() {
            return denied_module(&resolved);
        }
        None
    }

    /// `getattr(os, ...)` and friends on a guarded module
    fn reflection(&self, node: Node) -> Option<Category> {
        let function = node.child_by_field_name("function")?;
        if function.kind() != "identifier" || !REFLECTION_BUILTINS.contains(&self.text(function))
        {
            return None;
        }
        let arguments = node.child_by_field_name("arguments")?;
        let mut cursor = arguments.walk();
        let target = arguments.named_children(&mut cursor).next()?;
        if target.kind() != "identifier" {
            return None;
        }
        let name = self.text(target);
        guarded_module(self.resolve(name).unwrap_or(name))
    }
}

fn children(node: Node, role: Role) -> Vec<(Node, Role)> {
    let mut cursor = node.walk();
    node.children(&mut cursor).map(|child| (child, role)).collect()
}

fn first_identifier(node: Node) -> Option<Node> {
    if node.kind() == "identifier" {
        return Some(node);
    }
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == "identifier");
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied(source: &str) -> Option<Category> {
        match validate(source) {
            Verdict::Allowed => None,
            Verdict::Denied(category) => Some(category),
        }
    }

    #[test]
    fn test_plain_programs_are_allowed() {
        let sources = [
            "print('hello')",
            "import math, random, itertools\nprint(math.sqrt(2), random.random())",
            "import os.path\nprint(os.path.join('a', 'b'))",
            "import re\npattern = re.compile(r'\\d+')\nprint(pattern.findall('a1b22'))",
            "import sys\nsys.setrecursionlimit(10000)\nprint(sys.version)",
            "from collections import Counter\nprint(Counter('hello'))",
            "def fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)\nprint(fib(20))",
            "class Model:\n    def eval(self):\n        return 1\nprint(Model().eval())",
            "def gen():\n    yield from range(3)\nprint(list(gen()))",
            "try:\n    raise ValueError('x')\nexcept ValueError as e:\n    raise RuntimeError('y') from e",
            "with open('notes.txt', 'w') as f:\n    f.write('ok')",
            "code = 'abc'\nprint(code.upper())",
            "from concurrent.futures import ThreadPoolExecutor\nwith ThreadPoolExecutor() as ex:\n    print(list(ex.map(abs, [-1, 2])))",
            "from .helpers import thing",
        ];
        for source in sources {
            assert_eq!(validate(source), Verdict::Allowed, "{}", source);
        }
    }

    #[test]
    fn test_mentions_in_comments_and_strings_are_allowed() {
        let source = "# never call os.system here\nprint('import subprocess is banned')\nprint(\"eval(x)\")";
        assert_eq!(validate(source), Verdict::Allowed);
        assert_eq!(validate("s = '''\nimport socket\n'''\nprint(s)"), Verdict::Allowed);
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(denied(""), Some(Category::EmptySource));
        assert_eq!(denied("  \n\t"), Some(Category::EmptySource));
    }

    #[test]
    fn test_shell_execution() {
        let verdict = validate("import os; os.system('ls')");
        assert_eq!(verdict, Verdict::Denied(Category::ProcessSpawning));
        let reason = verdict.reason().unwrap();
        assert!(reason.contains("process spawning"));
        assert!(!reason.contains("ls"));

        assert_eq!(denied("import subprocess"), Some(Category::ProcessSpawning));
        assert_eq!(
            denied("from subprocess import run\nrun(['id'])"),
            Some(Category::ProcessSpawning)
        );
        assert_eq!(denied("import os as o\no.popen('id')"), Some(Category::ProcessSpawning));
        assert_eq!(denied("import os\nos.execvp('sh', ['sh'])"), Some(Category::ProcessSpawning));
        assert_eq!(denied("from os import *"), Some(Category::ProcessSpawning));
        assert_eq!(
            denied("import asyncio\nasyncio.create_subprocess_shell('ls')"),
            Some(Category::ProcessSpawning)
        );
    }

    #[test]
    fn test_process_pools() {
        assert_eq!(
            denied("import multiprocessing\nmultiprocessing.Process(target=print).start()"),
            Some(Category::ProcessSpawning)
        );
        assert_eq!(
            denied("from multiprocessing import Pool"),
            Some(Category::ProcessSpawning)
        );
        assert_eq!(
            denied("from concurrent.futures import ProcessPoolExecutor"),
            Some(Category::ProcessSpawning)
        );
        assert_eq!(
            denied("import concurrent.futures as cf\ncf.ProcessPoolExecutor()"),
            Some(Category::ProcessSpawning)
        );
        assert_eq!(
            denied("from concurrent import futures\nfutures.ProcessPoolExecutor()"),
            Some(Category::ProcessSpawning)
        );
        assert_eq!(
            denied("from concurrent.futures import *"),
            Some(Category::ProcessSpawning)
        );
    }

    #[test]
    fn test_nested_quotes_in_fstring() {
        // valid since Python 3.12: the inner quotes do not end the literal
        assert_eq!(
            denied("x = f\"{\"'\"}\"; import subprocess; subprocess.run(['id'])"),
            Some(Category::ProcessSpawning)
        );
        assert_eq!(
            denied("print(f\"{__import__('os').getcwd()}\")"),
            Some(Category::DynamicEvaluation)
        );
    }

    #[test]
    fn test_unparseable_regions_are_strict() {
        assert_eq!(
            denied("def broken(:\n    import subprocess"),
            Some(Category::ProcessSpawning)
        );
    }

    #[test]
    fn test_reflection_on_guarded_module() {
        assert_eq!(
            denied("import os\ngetattr(os, 'sys' + 'tem')('ls')"),
            Some(Category::ProcessSpawning)
        );
        assert_eq!(validate("class A:\n    x = 1\nprint(getattr(A(), 'x'))"), Verdict::Allowed);
    }

    #[test]
    fn test_network_access() {
        assert_eq!(denied("import socket"), Some(Category::NetworkAccess));
        assert_eq!(denied("import urllib.request"), Some(Category::NetworkAccess));
        assert_eq!(
            denied("from http.client import HTTPConnection"),
            Some(Category::NetworkAccess)
        );
        assert_eq!(denied("import requests as r"), Some(Category::NetworkAccess));
    }

    #[test]
    fn test_filesystem_escape() {
        assert_eq!(denied("import shutil"), Some(Category::FilesystemEscape));
        assert_eq!(denied("import os\nos.remove('/etc/hosts')"), Some(Category::FilesystemEscape));
        assert_eq!(denied("from os import chdir"), Some(Category::FilesystemEscape));
    }

    #[test]
    fn test_dynamic_evaluation() {
        assert_eq!(denied("eval('1+1')"), Some(Category::DynamicEvaluation));
        assert_eq!(denied("run = exec\nrun('x=1')"), Some(Category::DynamicEvaluation));
        assert_eq!(denied("m = __import__('os')"), Some(Category::DynamicEvaluation));
        assert_eq!(
            denied("().__class__.__bases__[0].__subclasses__()"),
            Some(Category::DynamicEvaluation)
        );
        assert_eq!(denied("import importlib"), Some(Category::DynamicEvaluation));
        assert_eq!(denied("import sys\nsys.modules['os']"), Some(Category::DynamicEvaluation));
    }

    #[test]
    fn test_environment_access() {
        assert_eq!(
            denied("import os\nkey = os.getenv('OPENAI_API_KEY')"),
            Some(Category::EnvironmentAccess)
        );
        assert_eq!(
            denied("import os\nprint(os.environ['OPENAI_API_KEY'])"),
            Some(Category::EnvironmentAccess)
        );
        assert_eq!(
            denied("from os import environ as env"),
            Some(Category::EnvironmentAccess)
        );
    }

    #[test]
    fn test_privilege_manipulation() {
        assert_eq!(denied("import os\nos.setuid(0)"), Some(Category::PrivilegeManipulation));
        assert_eq!(denied("os.kill(1, 9)"), Some(Category::PrivilegeManipulation));
    }

    #[test]
    fn test_limit_bypass() {
        assert_eq!(denied("import resource"), Some(Category::LimitBypass));
        assert_eq!(
            denied("import signal\nsignal.signal(signal.SIGTERM, signal.SIG_IGN)"),
            Some(Category::LimitBypass)
        );
    }

    #[test]
    fn test_names_bound_like_builtins() {
        assert_eq!(validate("def f(compile=False):\n    return 1\nf(compile=True)"), Verdict::Allowed);
        assert_eq!(validate("opts = dict(exec=1)"), Verdict::Allowed);
        assert_eq!(validate("def run(eval, *args):\n    return 1"), Verdict::Allowed);
        assert_ne!(validate("def f(x):\n    return compile\n"), Verdict::Allowed);
    }

    #[test]
    fn test_display() {
        assert_eq!(Category::ProcessSpawning.to_string(), "process_spawning");
        assert_eq!(Category::LimitBypass.to_string(), "limit_bypass");
        assert_eq!(
            Verdict::Denied(Category::NetworkAccess).to_string(),
            "denied (network_access)"
        );
        assert_eq!(Verdict::Allowed.to_string(), "allowed");
        assert_eq!(Verdict::Allowed.reason(), None);
        assert_eq!(
            Verdict::Denied(Category::EmptySource).reason(),
            Some("No code was submitted")
        );
    }
}
