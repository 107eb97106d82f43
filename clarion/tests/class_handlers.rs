use std::{any::Any, cell::RefCell, rc::Rc};

use clarion::{
	args, runtime::LoopRef, Args, Bound, BoxError, Class, ClassSignaller, ExternalSignaller,
	Handler, HandlerConfig, Method, NotifyOptions, Outcome, Params, Placement, Signal, SignalError,
	SignalOptions, SortMode,
};

mod _block_on;
use _block_on::assert_ready;

#[derive(PartialEq, Eq)]
enum Kind {
	Base,
	Derived,
}

struct Widget {
	kind: Kind,
}

type Changed = Signal<String, i32, Widget>;

fn named(name: &'static str) -> Method<String, i32, Widget> {
	Method::immediate(Params::new(), move |_, _| name.to_string())
}

fn base(changed: &Changed) -> Rc<Class<Widget>> {
	Class::builder("Base")
		.signal("changed", changed)
		.handler("changed", "b", named("b"))
		.handler("changed", "a", named("a"))
		.handler_with(
			"changed",
			"z",
			named("z"),
			HandlerConfig::new().with_placement(Placement::Begin),
		)
		.instances(|widget| widget.kind == Kind::Base)
		.build()
		.unwrap()
}

fn derived(base: &Class<Widget>) -> Rc<Class<Widget>> {
	Class::builder("Derived")
		.extends(base)
		.handler("changed", "c", named("c"))
		.handler("changed", "a", named("a'"))
		.handler_with(
			"changed",
			"y",
			named("y"),
			HandlerConfig::new().with_placement(Placement::End),
		)
		.instances(|widget| widget.kind == Kind::Derived)
		.build()
		.unwrap()
}

fn dispatch(changed: &Changed, widget: &Rc<Widget>) -> Vec<String> {
	assert_ready(changed.scope(widget).notify(Args::new()).unwrap())
		.unwrap()
		.to_vec()
}

#[test]
fn class_handlers_run_before_instance_handlers() {
	let changed = Changed::new();
	let _class = Class::builder("Widget")
		.signal("changed", &changed)
		.handler("changed", "ch", named("ch"))
		.build()
		.unwrap();
	assert_eq!(changed.name().as_deref(), Some("changed"));

	let c = Rc::new(Widget { kind: Kind::Base });
	changed
		.scope(&c)
		.connect(Handler::immediate(Params::new(), |_| "ih".to_string()))
		.unwrap();
	assert_eq!(dispatch(&changed, &c), ["ch", "ih"]);

	// Signal-level notifications have no instance to bind to.
	assert!(assert_ready(changed.notify(Args::new()).unwrap()).unwrap().is_empty());
}

#[test]
fn bottom_up_order() {
	let changed = Changed::new();
	let base = base(&changed);
	let derived = derived(&base);

	assert_eq!(base.handler_names("changed"), ["z", "a", "b"]);
	assert_eq!(derived.handler_names("changed"), ["z", "a", "b", "c", "y"]);

	let widget = Rc::new(Widget { kind: Kind::Derived });
	assert_eq!(dispatch(&changed, &widget), ["z", "a'", "b", "c", "y"]);

	let widget = Rc::new(Widget { kind: Kind::Base });
	assert_eq!(dispatch(&changed, &widget), ["z", "a", "b"]);
}

#[test]
fn top_down_order() {
	let changed = Changed::with_options(SignalOptions::new().sort(SortMode::TopDown));
	let derived = derived(&base(&changed));

	assert_eq!(derived.handler_names("changed"), ["z", "c", "a", "b", "y"]);
	let widget = Rc::new(Widget { kind: Kind::Derived });
	assert_eq!(dispatch(&changed, &widget), ["z", "c", "a'", "b", "y"]);
}

#[test]
fn named_signals_keep_their_name() {
	let changed = Changed::named("modified");
	let class = Class::builder("Widget")
		.signal("changed", &changed)
		.handler("modified", "m", named("m"))
		.build()
		.unwrap();
	assert_eq!(class.signal_names().collect::<Vec<_>>(), ["modified"]);
	assert_eq!(changed.name().as_deref(), Some("modified"));

	let widget = Rc::new(Widget { kind: Kind::Base });
	assert_eq!(dispatch(&changed, &widget), ["m"]);
}

#[test]
fn unknown_signals_are_rejected() {
	let error = Class::<Widget>::builder("Broken")
		.handler("missing", "h", named("h"))
		.build()
		.unwrap_err();
	assert!(matches!(
		error,
		SignalError::UnknownSignal { class, signal } if class == "Broken" && signal == "missing"
	));

	let class = Class::<Widget>::builder("Lenient")
		.handler_with("missing", "h", named("h"), HandlerConfig::new().unchecked())
		.build()
		.unwrap();
	assert_eq!(class.handler_names("missing"), ["h"]);
}

#[test]
fn mismatched_handler_types_are_rejected() {
	let changed = Changed::new();
	let error = Class::builder("Widget")
		.signal("changed", &changed)
		.handler(
			"changed",
			"wrong",
			Method::immediate(Params::<i32>::new(), |_: &Widget, _| 0_u8),
		)
		.build()
		.unwrap_err();
	assert!(matches!(
		error,
		SignalError::HandlerType { member, .. } if member == "wrong"
	));
}

#[test]
fn instances_predicate_selects_the_class() {
	let changed = Changed::new();
	let _base = Class::builder("Base")
		.signal("changed", &changed)
		.handler("changed", "base", named("base"))
		.instances(|widget| widget.kind == Kind::Base)
		.build()
		.unwrap();
	let other = Class::builder("Other")
		.signal("changed", &changed)
		.handler("changed", "other", named("other"))
		.instances(|widget| widget.kind == Kind::Derived)
		.build()
		.unwrap();
	assert!(other.describes(&Widget { kind: Kind::Derived }));

	assert_eq!(dispatch(&changed, &Rc::new(Widget { kind: Kind::Base })), ["base"]);
	assert_eq!(dispatch(&changed, &Rc::new(Widget { kind: Kind::Derived })), ["other"]);
}

#[test]
fn declared_handlers_bind_the_instance() {
	struct Counter {
		step: i32,
	}

	let bumped = Signal::<i32, i32, Counter>::new();
	let _class = Class::builder("Counter")
		.signal("bumped", &bumped)
		.handler(
			"bumped",
			"bump",
			Method::immediate(
				Params::new().arg("by"),
				|counter: &Counter, bound: Bound<i32>| counter.step * bound[0],
			),
		)
		.build()
		.unwrap();

	let counter = Rc::new(Counter { step: 3 });
	let results = bumped.scope(&counter).notify(args![5]).unwrap();
	assert_eq!(&*assert_ready(results).unwrap(), [15]);
}

#[test]
fn derived_classes_must_limit_their_instances() {
	let changed = Changed::new();
	let base = base(&changed);
	let error = Class::builder("Derived")
		.extends(&base)
		.handler("changed", "c", named("c"))
		.build()
		.unwrap_err();
	assert!(matches!(
		error,
		SignalError::MissingInstances { class } if class == "Derived"
	));
}

#[test]
fn classes_of_any_type() {
	struct Label;
	struct Slider;

	let moved = Signal::<&str, i32>::new();
	let _labels = Class::builder("Label")
		.signal("moved", &moved)
		.handler("moved", "label", Method::immediate(Params::<i32>::new(), |_, _| "label"))
		.of_type::<Label>()
		.build()
		.unwrap();
	let _sliders = Class::builder("Slider")
		.signal("moved", &moved)
		.handler("moved", "slider", Method::immediate(Params::<i32>::new(), |_, _| "slider"))
		.of_type::<Slider>()
		.build()
		.unwrap();

	let label: Rc<dyn Any> = Rc::new(Label);
	let slider: Rc<dyn Any> = Rc::new(Slider);
	let results = moved.scope(&label).notify(Args::new()).unwrap();
	assert_eq!(&*assert_ready(results).unwrap(), ["label"]);
	let results = moved.scope(&slider).notify(Args::new()).unwrap();
	assert_eq!(&*assert_ready(results).unwrap(), ["slider"]);
}

#[test]
fn connected_methods_are_not_declared_twice() {
	let changed = Changed::new();
	let method = named("m");
	let _class = Class::builder("Widget")
		.signal("changed", &changed)
		.handler("changed", "m", method.clone())
		.handler("changed", "n", named("n"))
		.build()
		.unwrap();

	let widget = Rc::new(Widget { kind: Kind::Base });
	changed.connect(method.bind(&widget)).unwrap();
	changed.scope(&widget).connect(method.bind(&widget)).unwrap();
	assert_eq!(dispatch(&changed, &widget), ["m", "n"]);

	// Other instances get their own binding, after the signal-level one.
	let other = Rc::new(Widget { kind: Kind::Base });
	assert_eq!(dispatch(&changed, &other), ["m", "m", "n"]);
}

#[derive(Default)]
struct Registry {
	signals: RefCell<Vec<String>>,
	classes: RefCell<Vec<(String, Vec<String>)>>,
	published: RefCell<Vec<String>>,
	refuse: bool,
}

impl ExternalSignaller<String, i32, Widget> for Registry {
	fn publish(
		&self,
		signal: &Changed,
		_instance: Option<&Rc<Widget>>,
		_event_loop: Option<&Rc<dyn LoopRef>>,
		_args: Args<i32>,
	) -> Result<Outcome<String>, BoxError> {
		let name = signal.name().map(|name| name.to_string()).unwrap_or_default();
		self.published.borrow_mut().push(name);
		Ok(Outcome::NoResult)
	}

	fn register_signal(&self, _signal: &Changed, name: &str) {
		self.signals.borrow_mut().push(name.to_string());
	}
}

impl ClassSignaller<String, i32, Widget> for Registry {
	fn register_class(&self, class: &Class<Widget>) -> Result<(), BoxError> {
		if self.refuse {
			return Err("registry closed".into());
		}
		self.classes.borrow_mut().push((
			class.name().to_string(),
			class.signal_names().map(str::to_string).collect(),
		));
		Ok(())
	}
}

#[test]
fn class_signaller_reaches_declared_signals() {
	let registry = Rc::new(Registry::default());
	let changed = Changed::new();
	let base = Class::builder("Base")
		.signal("changed", &changed)
		.handler("changed", "b", named("b"))
		.external(Rc::clone(&registry))
		.build()
		.unwrap();
	assert_eq!(*registry.signals.borrow(), ["changed"]);
	assert!(changed.external().is_some());

	let _derived = Class::builder("Derived")
		.extends(&base)
		.instances(|widget| widget.kind == Kind::Derived)
		.build()
		.unwrap();
	// Inherited signals aren't handed over again.
	assert_eq!(registry.signals.borrow().len(), 1);
	assert_eq!(
		*registry.classes.borrow(),
		[
			("Base".to_string(), vec!["changed".to_string()]),
			("Derived".to_string(), vec!["changed".to_string()]),
		]
	);

	let widget = Rc::new(Widget { kind: Kind::Base });
	assert_eq!(dispatch(&changed, &widget), ["b"]);
	assert_eq!(*registry.published.borrow(), ["changed"]);
}

#[test]
fn class_registration_failures_are_reported() {
	let registry = Rc::new(Registry {
		refuse: true,
		..Registry::default()
	});
	let changed = Changed::new();
	let error = Class::builder("Widget")
		.signal("changed", &changed)
		.handler("changed", "h", named("h"))
		.external(registry)
		.build()
		.unwrap_err();
	assert!(matches!(&error, SignalError::ClassRegistration { class, .. } if class == "Widget"));
	assert_eq!(
		error.to_string(),
		"error while registering class `Widget`: registry closed"
	);

	// The class was never attached.
	let widget = Rc::new(Widget { kind: Kind::Base });
	let quiet = NotifyOptions::new().notify_external(false);
	let results = changed.scope(&widget).notify_with(Args::new(), &quiet).unwrap();
	assert!(assert_ready(results).unwrap().is_empty());
}

#[test]
fn class_signaller_types_must_match() {
	let counted = Signal::<i32, i32, Widget>::new();
	let error = Class::builder("Widget")
		.signal("counted", &counted)
		.external(Rc::new(Registry::default()))
		.build()
		.unwrap_err();
	assert!(matches!(
		error,
		SignalError::ExternalType { signal, .. } if signal == "counted"
	));
}
