#[macro_use]
extern crate lazy_static;

use std::io::{self, BufRead};
use std::process;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use log::{debug, error};

use crate::application::{Action, Application};

mod application;
mod commands;
mod config;
mod loopback;
mod views;

fn read_input(actions: Sender<Action>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                error!("Could not read input: {}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match commands::parse(&line) {
            Ok(action) => {
                let exit = action == Action::Exit;
                if actions.send(action).is_err() || exit {
                    break;
                }
            }
            Err(message) => println!("{}", message),
        }
    }
    debug!("Input reader stopped");
}

fn main() {
    env_logger::init();

    let config = match config::load() {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    let (tx, rx) = unbounded();
    thread::spawn(move || read_input(tx));

    Application::new(config, rx).run();
}
