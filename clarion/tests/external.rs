use std::{cell::RefCell, rc::Rc};

use clarion::{
	args, runtime::LoopRef, Args, Bound, BoxError, ExternalSignaller, Handler, NotifyOptions, Outcome,
	Params, Signal, SignalError,
};

mod _block_on;
use _block_on::assert_ready;

struct Device {
	id: i32,
}

#[derive(Default)]
struct Bus {
	registered: RefCell<Vec<String>>,
	published: RefCell<Vec<(Option<String>, Option<i32>, Vec<i32>)>>,
	fail: bool,
}

impl ExternalSignaller<i32, i32, Device> for Bus {
	fn publish(
		&self,
		signal: &Signal<i32, i32, Device>,
		instance: Option<&Rc<Device>>,
		_event_loop: Option<&Rc<dyn LoopRef>>,
		args: Args<i32>,
	) -> Result<Outcome<i32>, BoxError> {
		if self.fail {
			return Err("bus unavailable".into());
		}
		self.published.borrow_mut().push((
			signal.name().map(|name| name.to_string()),
			instance.map(|device| device.id),
			args.positional().to_vec(),
		));
		Ok(Outcome::Value(-1))
	}

	fn register_signal(&self, _signal: &Signal<i32, i32, Device>, name: &str) {
		self.registered.borrow_mut().push(name.to_string());
	}
}

fn attach(signal: &Signal<i32, i32, Device>, bus: &Rc<Bus>) {
	signal.set_external(Some(Rc::clone(bus) as Rc<dyn ExternalSignaller<i32, i32, Device>>));
}

#[test]
fn named_signals_are_registered() {
	let bus = Rc::new(Bus::default());

	let named = Signal::<i32, i32, Device>::named("ping");
	attach(&named, &bus);
	assert_eq!(*bus.registered.borrow(), ["ping"]);

	let unnamed = Signal::<i32, i32, Device>::new();
	attach(&unnamed, &bus);
	assert_eq!(bus.registered.borrow().len(), 1);
	unnamed.set_name("pong");
	assert_eq!(*bus.registered.borrow(), ["ping", "pong"]);
}

#[test]
fn external_runs_last() {
	let bus = Rc::new(Bus::default());
	let signal = Signal::<i32, i32, Device>::named("ping");
	signal
		.connect(Handler::immediate(Params::new().arg("n"), |bound: Bound<i32>| bound[0] * 10))
		.unwrap();
	attach(&signal, &bus);

	let results = signal.notify(args![4]).unwrap();
	assert_eq!(&*assert_ready(results).unwrap(), [40, -1]);

	let device = Rc::new(Device { id: 7 });
	let results = signal.scope(&device).notify(args![5]).unwrap();
	assert_eq!(&*assert_ready(results).unwrap(), [50, -1]);

	assert_eq!(
		*bus.published.borrow(),
		[
			(Some("ping".to_string()), None, vec![4]),
			(Some("ping".to_string()), Some(7), vec![5]),
		]
	);
}

#[test]
fn external_can_be_skipped() {
	let bus = Rc::new(Bus::default());
	let signal = Signal::<i32, i32, Device>::named("ping");
	attach(&signal, &bus);
	let device = Rc::new(Device { id: 1 });

	let quiet = NotifyOptions::new().notify_external(false);
	assert!(assert_ready(signal.notify_with(Args::new(), &quiet).unwrap()).unwrap().is_empty());
	let results = signal.scope(&device).notify_no_external(Args::new()).unwrap();
	assert!(assert_ready(results).unwrap().is_empty());
	assert!(bus.published.borrow().is_empty());
}

#[test]
fn external_failures_are_reported() {
	let bus = Rc::new(Bus {
		fail: true,
		..Bus::default()
	});
	let signal = Signal::<i32, i32, Device>::named("ping");
	attach(&signal, &bus);

	let error = signal.notify(Args::new()).unwrap_err();
	assert!(matches!(error, SignalError::External(_)));
	assert_eq!(error.to_string(), "external signaller failed: bus unavailable");
}
