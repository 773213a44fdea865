//! Companion script pushed to the board before helper-dependent
//! operations.
//!
//! Defines, in the board's global namespace:
//! - `get_all_files(path)`: recursive listing as `[{path, type}]`
//! - `ilist_all(path)`: the same listing printed as JSON
//! - `delete_folder(path)`: files first, then folders deepest first,
//!   then `path` itself
//! - `b2a_base64(data)`: standard alphabet with `=` padding, since
//!   minimal firmware builds ship without `binascii`

/// The script itself.
pub const HELPER_CODE: &str = r#"import os
import json
os.chdir('/')

def is_directory(path):
  return os.stat(path)[0] == 0x4000

def get_all_files(path, array_of_files=None):
  if array_of_files is None:
    array_of_files = []
  for file in os.ilistdir(path):
    is_folder = file[1] == 0x4000
    p = path + '/' + file[0]
    array_of_files.append({
      "path": p,
      "type": "folder" if is_folder else "file"
    })
    if is_folder:
      get_all_files(p, array_of_files)
  return array_of_files

def ilist_all(path):
  print(json.dumps(get_all_files(path)))

def delete_folder(path):
  files = get_all_files(path)
  for file in files:
    if file['type'] == 'file':
      os.remove(file['path'])
  for file in reversed(files):
    if file['type'] == 'folder':
      os.rmdir(file['path'])
  os.rmdir(path)

def b2a_base64(data):
  chars = b'ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/'
  encoded = bytearray()
  for i in range(0, len(data), 3):
    chunk = data[i:i+3]
    n = len(chunk)
    v = chunk[0] << 16
    if n > 1:
      v |= chunk[1] << 8
    if n > 2:
      v |= chunk[2]
    encoded.append(chars[(v >> 18) & 63])
    encoded.append(chars[(v >> 12) & 63])
    encoded.append(chars[(v >> 6) & 63] if n > 1 else 61)
    encoded.append(chars[v & 63] if n > 2 else 61)
  return bytes(encoded)
"#;
