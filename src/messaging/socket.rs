use std::io::{ErrorKind, Read};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;
use std::{fs, io, thread};

use crate::config;
use crate::error::SkipwardenError;
use crate::messaging::ClientMessage;

pub fn open_and_listen_unix_socket(tx: Sender<ClientMessage>) -> Result<(), SkipwardenError> {
    let path = get_and_create_socket_path()?;
    let path = path.join(SOCKET_FILENAME);
    // If the socket file already exists, just remove it. If we open the existing file, we get
    // the error message "Address already in use".
    remove_socketfile(&path)?;
    let listener = UnixListener::bind(&path)?;
    info!("Listening for commands on {:?}", path);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let tx = tx.clone();
                thread::spawn(move || {
                    handle_client(stream, tx, CLIENT_READ_TIMEOUT);
                });
            }
            Err(err) => {
                error!("Error accepting connection on unix socket: {}", err);
            }
        }
    }

    Ok(())
}

fn get_and_create_socket_path() -> Result<PathBuf, SkipwardenError> {
    let path = config::get_runtime_directory()?;
    match fs::create_dir_all(&path) {
        Ok(()) => Ok(path),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(path),
        Err(e) => Err(e.into()),
    }
}

fn remove_socketfile(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            // No file to remove, because it didn't exist in the first place.
            Ok(())
        }
        err => err,
    }
}

/// A command ends when the client closes its side of the connection. Clients that neither send
/// nor close within `read_timeout` are dropped.
fn handle_client(mut stream: UnixStream, tx: Sender<ClientMessage>, read_timeout: Duration) {
    if let Err(e) = stream.set_read_timeout(Some(read_timeout)) {
        error!("Unable to set read timeout on socket: {:?}", e);
        return;
    }
    let message = match read_string(&mut stream) {
        Ok(s) => s,
        Err(e) => {
            error!("Unable to read message from socket: {:?}", e);
            return;
        }
    };
    match ClientMessage::parse(&message) {
        Ok(message) => {
            debug!("Received {:?}", message);
            if let Err(e) = tx.send(message) {
                warn!("Unable to forward message: {:?}", e);
            }
        }
        Err(reason) => {
            warn!("{}", reason);
        }
    }
}

fn read_string<R>(stream: &mut R) -> io::Result<String>
where
    R: Read,
{
    let mut buffer = String::new();
    stream.read_to_string(&mut buffer)?;
    Ok(buffer)
}

const SOCKET_FILENAME: &str = "skipwarden.sock";
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(5);
